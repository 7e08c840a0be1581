//! CLI binary for mediaconv.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, builds requests from files on disk, and writes results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use mediaconv::{
    tool_report, CancellationToken, ConversionRequest, ConversionResult, ConvertError, Endpoint,
    ErrorResponse, OutputOptions, Payload, Pipeline, PipelineConfig, RequestContext,
    TargetFormat, ToolSpec,
};
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Several scans into one PDF
  mediaconv image-to-pdf scan-1.jpg scan-2.heic scan-3.png -o scans.pdf

  # Second page of a PDF as PNG
  mediaconv pdf-to-image report.pdf --to png --page 2 -o page2.png

  # Batch-convert a folder of iPhone photos to JPEG, 8 at a time
  mediaconv convert --endpoint heic-to-image --to jpg -j 8 --out-dir out/ photos/*.heic

  # What is installed?
  mediaconv tools

EXIT STATUS:
  0  success
  1  conversion failed (decode error, tool failure, timeout, I/O)
  2  request rejected (bad extension, empty input, unsupported pair, too large)

ENVIRONMENT VARIABLES:
  MEDIACONV_IMAGEMAGICK   ImageMagick binary (default: magick, then convert)
  MEDIACONV_FFMPEG        ffmpeg binary (default: ffmpeg on PATH)
  MEDIACONV_PDFIUM_LIB    PDFium library file or directory
  PDFIUM_LIB_PATH         Same, consulted when MEDIACONV_PDFIUM_LIB is unset
  MEDIACONV_TOOL_TIMEOUT  Seconds before an external tool is killed
  RUST_LOG                Overrides --verbose / --quiet log filtering
"#;

/// Convert images and PDFs between formats.
#[derive(Parser, Debug)]
#[command(
    name = "mediaconv",
    version,
    about = "Convert images and PDFs between formats",
    long_about = "Convert JPEG, PNG, WebP, HEIC and AVIF images between formats, \
assemble images into a PDF, and render PDF pages to images. HEIC and AVIF go through \
ImageMagick and ffmpeg; PDF rendering uses PDFium.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    config: ConfigArgs,

    /// Print results and errors as JSON on stdout.
    #[arg(long, global = true, env = "MEDIACONV_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MEDIACONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MEDIACONV_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble one or more images into a single PDF, one page each.
    ImageToPdf {
        /// Images in page order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file. Default: converted.pdf
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render one PDF page to PNG or JPEG.
    PdfToImage {
        input: PathBuf,

        /// png or jpg; anything else renders JPEG.
        #[arg(long, default_value = "jpg")]
        to: String,

        /// 1-indexed page number.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,

        /// Output file. Default: converted.<ext>
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert many single files concurrently.
    Convert {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target format: jpg, jpeg, png, webp or pdf.
        #[arg(long, default_value = "jpg")]
        to: String,

        /// Entry point whose accepted extensions apply.
        #[arg(long, value_enum, default_value = "image")]
        endpoint: EndpointArg,

        /// Directory for results, named <input stem>.<ext>.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Conversions in flight at once.
        #[arg(short = 'j', long, env = "MEDIACONV_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,
    },

    /// List external tools and libraries and whether they were found.
    Tools,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EndpointArg {
    Image,
    WebpToImage,
    HeicToImage,
    AvifToImage,
    PdfToImage,
}

impl From<EndpointArg> for Endpoint {
    fn from(v: EndpointArg) -> Self {
        match v {
            EndpointArg::Image => Endpoint::Image,
            EndpointArg::WebpToImage => Endpoint::WebpToImage,
            EndpointArg::HeicToImage => Endpoint::HeicToImage,
            EndpointArg::AvifToImage => Endpoint::AvifToImage,
            EndpointArg::PdfToImage => Endpoint::PdfToImage,
        }
    }
}

/// Pipeline settings shared by every subcommand.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Seconds before an external tool is killed.
    #[arg(long, global = true, env = "MEDIACONV_TOOL_TIMEOUT", default_value_t = 120)]
    tool_timeout: u64,

    /// ImageMagick binary.
    #[arg(long, global = true, env = "MEDIACONV_IMAGEMAGICK")]
    imagemagick: Option<PathBuf>,

    /// ffmpeg binary.
    #[arg(long, global = true, env = "MEDIACONV_FFMPEG")]
    ffmpeg: Option<PathBuf>,

    /// PDFium shared library, or the directory containing it.
    #[arg(long, global = true, env = "MEDIACONV_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Scratch directory for external tools.
    #[arg(long, global = true, env = "MEDIACONV_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// PDF rendering DPI (36–600).
    #[arg(long, global = true, env = "MEDIACONV_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    dpi: u32,

    /// Longest edge of a rendered PDF page, in pixels.
    #[arg(long, global = true, env = "MEDIACONV_MAX_PIXELS", default_value_t = 10_000)]
    max_pixels: u32,

    /// JPEG quality (1–100).
    #[arg(long, global = true, env = "MEDIACONV_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Background for flattened transparency, as RRGGBB hex.
    #[arg(long, global = true, env = "MEDIACONV_BACKGROUND", default_value = "ffffff",
          value_parser = parse_hex_rgb)]
    background: [u8; 3],

    /// Reject files whose content does not match their extension.
    #[arg(long, global = true, env = "MEDIACONV_VERIFY_CONTENT")]
    verify_content: bool,

    /// Largest accepted input, in bytes.
    #[arg(long, global = true, env = "MEDIACONV_MAX_INPUT_BYTES", default_value_t = 64 * 1024 * 1024)]
    max_input_bytes: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || cli.json {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", red("error:"));
            exit_code_for(e.downcast_ref::<ConvertError>())
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = build_config(&cli.config)?;
    let pipeline = Pipeline::new(config);

    // Ctrl-C cancels every in-flight request; children are killed.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    let out = Printer {
        json: cli.json,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Tools => {
            let report = tokio::task::spawn_blocking(move || tool_report(pipeline.config()))
                .await
                .context("tool probe panicked")?;
            out.tools(&report)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::ImageToPdf { inputs, output } => {
            let mut payloads = Vec::with_capacity(inputs.len());
            for path in &inputs {
                payloads.push(read_payload(path).await?);
            }
            let request = ConversionRequest::new(Endpoint::ImageToPdf, payloads);
            let label = format!("{} image(s)", inputs.len());
            single(&pipeline, request, &label, output, &shutdown, &out).await
        }
        Command::PdfToImage {
            input,
            to,
            page,
            output,
        } => {
            let payload = read_payload(&input).await?;
            let request = ConversionRequest::single(Endpoint::PdfToImage, payload)
                .with_target_str(&to)
                .with_options(OutputOptions {
                    quality: None,
                    page: Some(page as usize),
                });
            let label = input.display().to_string();
            single(&pipeline, request, &label, output, &shutdown, &out).await
        }
        Command::Convert {
            inputs,
            to,
            endpoint,
            out_dir,
            concurrency,
        } => {
            let target = TargetFormat::parse_lenient(&to);
            tokio::fs::create_dir_all(&out_dir)
                .await
                .with_context(|| format!("Failed to create {}", out_dir.display()))?;
            batch(
                &pipeline,
                inputs,
                endpoint.into(),
                target,
                &out_dir,
                concurrency.max(1),
                &shutdown,
                &out,
            )
            .await
        }
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(args: &ConfigArgs) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .tool_timeout(Duration::from_secs(args.tool_timeout))
        .render_dpi(args.dpi)
        .max_render_pixels(args.max_pixels)
        .jpeg_quality(args.quality)
        .background(args.background)
        .verify_content(args.verify_content)
        .max_input_bytes(args.max_input_bytes);

    if let Some(ref p) = args.imagemagick {
        builder = builder.imagemagick(ToolSpec::new(p));
    }
    if let Some(ref p) = args.ffmpeg {
        builder = builder.ffmpeg(ToolSpec::new(p));
    }
    if let Some(ref p) = args.pdfium_lib {
        builder = builder.pdfium_library(p);
    }
    if let Some(ref p) = args.temp_dir {
        builder = builder.temp_dir(p);
    }
    builder.build().context("Invalid configuration")
}

fn parse_hex_rgb(s: &str) -> Result<[u8; 3], String> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("expected RRGGBB, got '{s}'"));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| format!("bad hex in '{s}'"))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

async fn read_payload(path: &Path) -> Result<Payload> {
    Payload::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn write_result(result: &ConversionResult, path: &Path) -> Result<()> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let bytes = result.bytes().to_vec();
    let dest = path.to_path_buf();
    // Unique temp file in the destination directory, then an atomic rename.
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".mediaconv-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .with_context(|| format!("Failed to create a temp file in {}", dir.display()))?;
        tmp.write_all(&bytes)
            .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
        tmp.persist(&dest)
            .with_context(|| format!("Failed to move output to {}", dest.display()))?;
        Ok(())
    })
    .await
    .context("write task panicked")?
}

async fn single(
    pipeline: &Pipeline,
    request: ConversionRequest,
    label: &str,
    output: Option<PathBuf>,
    shutdown: &CancellationToken,
    out: &Printer,
) -> Result<ExitCode> {
    let ctx = RequestContext::new().with_cancel_token(shutdown.child_token());
    let started = Instant::now();
    match pipeline.run(request, &ctx).await {
        Ok(result) => {
            let path = output.unwrap_or_else(|| PathBuf::from(result.filename()));
            write_result(&result, &path).await?;
            out.success(label, &path, &result, started.elapsed());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            out.failure(label, &e);
            Ok(exit_code_for(Some(&e)))
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn batch(
    pipeline: &Pipeline,
    inputs: Vec<PathBuf>,
    endpoint: Endpoint,
    target: TargetFormat,
    out_dir: &Path,
    concurrency: usize,
    shutdown: &CancellationToken,
    out: &Printer,
) -> Result<ExitCode> {
    let bar = if out.quiet || out.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(inputs.len() as u64)
    };
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    bar.set_prefix("Converting");
    bar.enable_steady_tick(Duration::from_millis(80));

    let stems = output_stems(&inputs);
    let outcomes: Vec<Option<ConvertError>> = stream::iter(inputs.into_iter().zip(stems))
        .map(|(path, stem)| {
            let bar = bar.clone();
            async move {
                let label = path.display().to_string();
                let started = Instant::now();
                let ctx = RequestContext::new().with_cancel_token(shutdown.child_token());
                let outcome = match Payload::from_path(&path).await {
                    Ok(payload) => {
                        let request = ConversionRequest::single(endpoint, payload).with_target(target);
                        pipeline.run(request, &ctx).await
                    }
                    Err(e) => Err(e),
                };
                let failure = match outcome {
                    Ok(result) => {
                        let dest = out_dir.join(output_name(&stem, &result));
                        match write_result(&result, &dest).await {
                            Ok(()) => {
                                bar.suspend(|| out.success(&label, &dest, &result, started.elapsed()));
                                None
                            }
                            Err(e) => {
                                let err = ConvertError::Internal(format!("{e:#}"));
                                bar.suspend(|| out.failure(&label, &err));
                                Some(err)
                            }
                        }
                    }
                    Err(e) => {
                        bar.suspend(|| out.failure(&label, &e));
                        Some(e)
                    }
                };
                bar.inc(1);
                failure
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;
    bar.finish_and_clear();

    let failed: Vec<&ConvertError> = outcomes.iter().flatten().collect();
    if !out.quiet && !out.json {
        let total = outcomes.len();
        let ok = total - failed.len();
        eprintln!(
            "{}  {}/{} converted",
            if failed.is_empty() { green("✔") } else { red("✘") },
            bold(&ok.to_string()),
            total
        );
    }
    // Any server-class failure wins over client-class ones.
    Ok(match failed.iter().find(|e| !e.kind().is_client_error()) {
        Some(e) => exit_code_for(Some(*e)),
        None => exit_code_for(failed.first().copied()),
    })
}

/// One output stem per input, unique within the batch.
///
/// Inputs sharing a stem (`x/a.png`, `y/a.png`, `a.heic`) would otherwise
/// land on the same file; later ones get `-2`, `-3`, ... avoiding every stem
/// already taken by another input.
fn output_stems(inputs: &[PathBuf]) -> Vec<String> {
    let stem_of = |p: &PathBuf| {
        p.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "converted".to_string())
    };
    let natural: HashSet<String> = inputs.iter().map(stem_of).collect();
    let mut taken = HashSet::new();
    inputs
        .iter()
        .map(|p| {
            let stem = stem_of(p);
            if taken.insert(stem.clone()) {
                return stem;
            }
            let unique = (2..)
                .map(|n| format!("{stem}-{n}"))
                .find(|c| !natural.contains(c) && !taken.contains(c))
                .unwrap_or_default();
            taken.insert(unique.clone());
            unique
        })
        .collect()
}

/// `<stem>.<result ext>`
fn output_name(stem: &str, result: &ConversionResult) -> PathBuf {
    let ext = Path::new(result.filename())
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    PathBuf::from(format!("{stem}.{ext}"))
}

fn exit_status(err: Option<&ConvertError>) -> u8 {
    match err {
        None => 0,
        Some(e) if e.kind().is_client_error() => 2,
        Some(_) => 1,
    }
}

fn exit_code_for(err: Option<&ConvertError>) -> ExitCode {
    ExitCode::from(exit_status(err))
}

/// Human or JSON reporting, on stderr and stdout respectively.
struct Printer {
    json: bool,
    quiet: bool,
}

impl Printer {
    fn success(&self, input: &str, path: &Path, result: &ConversionResult, took: Duration) {
        if self.json {
            let line = serde_json::json!({
                "input": input,
                "output": path,
                "mime_type": result.mime_type(),
                "bytes": result.len(),
                "elapsed_ms": took.as_millis() as u64,
            });
            println!("{line}");
        } else if !self.quiet {
            eprintln!(
                "{} {}  →  {}  {}",
                green("✔"),
                input,
                bold(&path.display().to_string()),
                dim(&format!("{} bytes, {}ms", result.len(), took.as_millis())),
            );
        }
    }

    fn failure(&self, input: &str, err: &ConvertError) {
        if self.json {
            let line = serde_json::json!({
                "input": input,
                "error": ErrorResponse::from(err),
            });
            println!("{line}");
        } else {
            eprintln!("{} {}  {}", red("✘"), input, err);
        }
    }

    fn tools(&self, report: &[mediaconv::ToolInfo]) -> Result<()> {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(report).context("Failed to serialise report")?
            );
            return Ok(());
        }
        for t in report {
            let mark = if t.available { green("✔") } else { red("✘") };
            let path = t
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not found".into());
            println!("{mark} {:<12} {}", bold(&t.name), path);
            if let Some(ref v) = t.version {
                println!("  {}", dim(v));
            }
        }
        Ok(())
    }
}
