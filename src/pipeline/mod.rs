//! Converters, one module per strategy.
//!
//! ## Data Flow
//!
//! ```text
//!                        ┌─▶ raster ──▶ encode             JPEG/PNG/WebP ↔ each other
//! validate ─▶ registry ─┼─▶ assemble                       rasters → multi-page PDF
//!                        ├─▶ render ──▶ encode             PDF page → PNG/JPEG (pdfium)
//!                        └─▶ external ─▶ raster ─▶ encode  HEIC/AVIF via magick/ffmpeg
//! ```
//!
//! 1. [`raster`]   — decode, alpha flattening, in-process raster conversion
//! 2. [`encode`]   — `DynamicImage` to target bytes
//! 3. [`assemble`] — one PDF page per image at 72 dpi
//! 4. [`render`]   — one PDF page to a raster; runs in `spawn_blocking`
//! 5. [`external`] — child-process conversion through scratch files
//! 6. [`pdfium`]   — library lookup and binding

pub mod assemble;
pub mod encode;
pub mod external;
pub mod pdfium;
pub mod raster;
pub mod render;

use crate::config::PipelineConfig;
use crate::context::RequestContext;
use crate::error::ConvertError;
use crate::temp::TempSpace;

/// Borrowed per-request state a converter may need.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub config: &'a PipelineConfig,
    pub ctx: &'a RequestContext,
    pub temp: &'a TempSpace,
}

/// Run CPU-bound work on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ConvertError>
where
    F: FnOnce() -> Result<T, ConvertError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConvertError::Internal(format!("conversion task failed: {e}")))?
}
