//! PDF rasterisation: render one page to PNG or JPEG via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps a C++ library that keeps thread-local state and
//! does CPU-heavy work, so rendering runs on the blocking pool rather than on
//! a Tokio worker.
//!
//! Pages are scaled by `render_dpi / 72` and then capped at
//! `max_render_pixels` on either edge, so a poster-sized page cannot blow up
//! memory.

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::ConvertError;
use crate::format::TargetFormat;
use crate::request::Payload;

use super::encode::encode;
use super::raster::prepare_for;
use super::{blocking, pdfium};

/// Render page `page` (1-indexed, default 1) of `payload` into `target`.
///
/// `target` must already be PNG or JPEG; the registry collapses anything
/// else to JPEG before this point.
pub async fn pdf_to_image(
    payload: Payload,
    target: TargetFormat,
    page: Option<usize>,
    quality: u8,
    config: &PipelineConfig,
) -> Result<Vec<u8>, ConvertError> {
    let config = config.clone();
    blocking(move || {
        let img = render_page_blocking(&payload, page.unwrap_or(1), &config)?;
        let img = prepare_for(img, target.format, config.background);
        encode(&img, target.format, quality)
    })
    .await
}

/// Number of pages in a PDF payload.
pub async fn page_count(payload: Payload, config: &PipelineConfig) -> Result<usize, ConvertError> {
    let config = config.clone();
    blocking(move || {
        let pdfium = pdfium::bind(&config)?;
        let document = load(&pdfium, &payload)?;
        let count = document.pages().len() as usize;
        Ok(count)
    })
    .await
}

fn load<'a>(pdfium: &'a Pdfium, payload: &'a Payload) -> Result<PdfDocument<'a>, ConvertError> {
    pdfium
        .load_pdf_from_byte_slice(&payload.bytes, None)
        .map_err(|e| ConvertError::decode(&payload.filename, format!("{e:?}")))
}

fn render_page_blocking(
    payload: &Payload,
    page_num: usize,
    config: &PipelineConfig,
) -> Result<DynamicImage, ConvertError> {
    let pdfium = pdfium::bind(config)?;
    let document = load(&pdfium, payload)?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!(file = %payload.filename, pages = total, "PDF loaded");

    if total == 0 {
        return Err(ConvertError::decode(&payload.filename, "PDF has no pages"));
    }
    if page_num == 0 || page_num > total {
        return Err(ConvertError::decode(
            &payload.filename,
            format!("page {page_num} out of range (document has {total})"),
        ));
    }

    let page = pages
        .get((page_num - 1) as u16)
        .map_err(|e| ConvertError::decode(&payload.filename, format!("page {page_num}: {e:?}")))?;

    let max = config.max_render_pixels as i32;
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(config.render_dpi as f32 / 72.0)
        .set_maximum_width(max)
        .set_maximum_height(max);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ConvertError::decode(&payload.filename, format!("render page {page_num}: {e:?}")))?;

    let image = bitmap.as_image();
    debug!(
        page = page_num,
        width = image.width(),
        height = image.height(),
        dpi = config.render_dpi,
        "rendered page"
    );
    Ok(image)
}
