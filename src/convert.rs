//! The conversion orchestrator.
//!
//! [`Pipeline::run`] drives one request through
//! `Received → Validated → Resolved → Converting → Succeeded | Failed`.
//! There are no retries: the first error is terminal and is reported with
//! its [`ErrorKind`](crate::ErrorKind). Cancellation is checked between
//! stages and raced against any child process.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::PipelineConfig;
use crate::context::{RequestContext, Stage};
use crate::error::ConvertError;
use crate::format::Format;
use crate::output::ConversionResult;
use crate::pipeline::assemble::{images_to_pdf, PageSource};
use crate::pipeline::{blocking, external, raster, render, Scope};
use crate::registry::{self, Converter};
use crate::request::{ConversionRequest, Payload};
use crate::temp::TempSpace;
use crate::tool::{tool_report, ToolInfo};
use crate::validate::{validate, verify_content};

/// A configured converter. Cheap to clone and safe to share across tasks.
///
/// # Example
/// ```rust,no_run
/// use mediaconv::{ConversionRequest, Endpoint, Payload, Pipeline, PipelineConfig, RequestContext};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = Pipeline::new(PipelineConfig::default());
/// let payload = Payload::from_path("photo.heic").await?;
/// let request = ConversionRequest::single(Endpoint::HeicToImage, payload).with_target_str("png");
/// let result = pipeline.run(request, &RequestContext::new()).await?;
/// std::fs::write(result.filename(), result.bytes())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self::from_arc(Arc::new(config))
    }

    pub fn from_arc(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Availability of every external dependency.
    pub fn tool_report(&self) -> Vec<ToolInfo> {
        tool_report(&self.config)
    }

    /// Convert one request.
    ///
    /// The observer in `ctx` sees every stage and the final outcome. All
    /// scratch files are gone by the time this returns, whatever the result.
    pub async fn run(
        &self,
        request: ConversionRequest,
        ctx: &RequestContext,
    ) -> Result<ConversionResult, ConvertError> {
        let span = info_span!(
            "conversion",
            request_id = %ctx.id(),
            endpoint = %request.endpoint,
        );
        async move {
            let started = Instant::now();
            let outcome = self.drive(request, ctx).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &outcome {
                Ok(result) => {
                    ctx.stage(Stage::Succeeded);
                    info!(
                        filename = result.filename(),
                        bytes = result.len(),
                        elapsed_ms,
                        "conversion succeeded"
                    );
                }
                Err(e) => {
                    ctx.stage(Stage::Failed);
                    warn!(kind = %e.kind(), error = %e, elapsed_ms, "conversion failed");
                }
            }
            ctx.complete(outcome.as_ref());
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        request: ConversionRequest,
        ctx: &RequestContext,
    ) -> Result<ConversionResult, ConvertError> {
        ctx.stage(Stage::Received);
        ctx.check_cancelled()?;
        request.check_size(self.config.max_input_bytes)?;

        // ── Validate ─────────────────────────────────────────────────────
        let formats = self.validate(&request)?;
        ctx.stage(Stage::Validated);

        // ── Resolve ──────────────────────────────────────────────────────
        let requested = request.effective_target();
        let (descriptor, target) = registry::resolve(formats[0], requested)?;
        for &f in &formats[1..] {
            registry::resolve(f, requested)?;
        }
        let converter = descriptor.converter;
        if request.payloads.len() > 1 && !converter.accepts_many() {
            return Err(ConvertError::TooManyInputs {
                converter: converter.name(),
                count: request.payloads.len(),
            });
        }
        ctx.stage(Stage::Resolved);
        debug!(
            converter = converter.name(),
            strategy = ?descriptor.strategy,
            target = %target,
            inputs = request.payloads.len(),
            "converter resolved"
        );

        // ── Convert ──────────────────────────────────────────────────────
        ctx.check_cancelled()?;
        ctx.stage(Stage::Converting);

        let temp = TempSpace::new(&self.config.temp_dir, ctx.id());
        let scope = Scope {
            config: &self.config,
            ctx,
            temp: &temp,
        };
        let quality = request
            .options
            .quality
            .map(|q| q.clamp(1, 100))
            .unwrap_or(self.config.jpeg_quality);
        let page = request.options.page;
        let source = formats[0];
        let mut payloads = request.payloads;

        let bytes = match converter {
            Converter::ImageCodec => {
                let payload = payloads.swap_remove(0);
                let background = self.config.background;
                blocking(move || raster::image_to_image(&payload, source, target, quality, background))
                    .await?
            }
            Converter::PdfAssembler => assemble(payloads, formats, &scope).await?,
            Converter::PdfRaster => {
                render::pdf_to_image(payloads.swap_remove(0), target, page, quality, &self.config)
                    .await?
            }
            Converter::External(tool) => {
                external::convert_external(tool, &payloads[0], source, target, quality, &scope)
                    .await?
            }
        };
        ctx.check_cancelled()?;

        Ok(ConversionResult::new(bytes, target))
    }

    /// Check every payload against the endpoint, returning their formats.
    fn validate(&self, request: &ConversionRequest) -> Result<Vec<Format>, ConvertError> {
        if request.payloads.is_empty() {
            return Err(ConvertError::EmptyInput { filename: None });
        }
        let accepted = request.endpoint.accepted_extensions();
        request
            .payloads
            .iter()
            .map(|p| {
                let format = validate(&p.filename, accepted)?;
                if p.is_empty() {
                    return Err(ConvertError::EmptyInput {
                        filename: Some(p.filename.clone()),
                    });
                }
                if self.config.verify_content {
                    verify_content(p, format)?;
                }
                Ok(format)
            })
            .collect()
    }
}

/// Decode HEIC/AVIF pages through their tools, then build the PDF.
async fn assemble(
    payloads: Vec<Payload>,
    formats: Vec<Format>,
    scope: &Scope<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let mut sources = Vec::with_capacity(payloads.len());
    for (payload, format) in payloads.into_iter().zip(formats) {
        scope.ctx.check_cancelled()?;
        let source = match registry::external_decoder(format) {
            Some(tool) => {
                let png = external::decode_via_tool(tool, &payload, format, scope).await?;
                PageSource {
                    payload: Payload::new(payload.filename, png),
                    format: Format::Png,
                }
            }
            None => PageSource { payload, format },
        };
        sources.push(source);
    }
    let background = scope.config.background;
    blocking(move || images_to_pdf(&sources, background)).await
}

/// Convert with a one-off pipeline and a fresh context.
pub async fn convert(
    request: ConversionRequest,
    config: &PipelineConfig,
) -> Result<ConversionResult, ConvertError> {
    Pipeline::new(config.clone())
        .run(request, &RequestContext::new())
        .await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    request: ConversionRequest,
    config: &PipelineConfig,
) -> Result<ConversionResult, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(request, config))
}
