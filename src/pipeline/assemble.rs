//! Multi-page PDF assembly with `printpdf`.
//!
//! One page per image, in input order. Pages are not resized: each image is
//! placed at 72 dpi so one pixel is one point and the page matches the image.

use image::DynamicImage;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, info};

use crate::error::ConvertError;
use crate::format::Format;
use crate::request::Payload;

use super::raster::{decode, flatten_alpha};

const PAGE_DPI: f32 = 72.0;

/// A payload ready for in-process decoding: its name, format and bytes.
///
/// HEIC/AVIF inputs arrive here already converted to PNG by their tool.
#[derive(Debug)]
pub struct PageSource {
    pub payload: Payload,
    pub format: Format,
}

/// Decode every page source and assemble them into one PDF.
///
/// The first decode failure aborts the whole document.
pub fn images_to_pdf(sources: &[PageSource], background: [u8; 3]) -> Result<Vec<u8>, ConvertError> {
    if sources.is_empty() {
        return Err(ConvertError::EmptyInput { filename: None });
    }
    let images = sources
        .iter()
        .map(|s| decode(&s.payload, s.format).map(|img| flatten_alpha(img, background)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(assemble(&images))
}

/// Build a PDF from already-decoded images.
pub fn assemble(images: &[DynamicImage]) -> Vec<u8> {
    let mut doc = PdfDocument::new("converted");
    let mut pages = Vec::with_capacity(images.len());

    for (i, img) in images.iter().enumerate() {
        let rgb = img.to_rgb8();
        let (w, h) = rgb.dimensions();
        let raw = RawImage {
            pixels: RawImageData::U8(rgb.into_raw()),
            width: w as usize,
            height: h as usize,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        let id = doc.add_image(&raw);

        let ops = vec![Op::UseXobject {
            id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                scale_x: None,
                scale_y: None,
                dpi: Some(PAGE_DPI),
                rotate: None,
            },
        }];
        pages.push(PdfPage::new(px_to_mm(w), px_to_mm(h), ops));
        debug!(page = i + 1, width = w, height = h, "page placed");
    }

    doc.with_pages(pages);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    info!(pages = images.len(), bytes = bytes.len(), "assembled PDF");
    bytes
}

fn px_to_mm(px: u32) -> Mm {
    Mm(px as f32 * 25.4 / PAGE_DPI)
}
