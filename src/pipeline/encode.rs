//! Image encoding: `DynamicImage` → bytes in a target raster format.
//!
//! JPEG always goes through RGB8 with an explicit quality. PNG keeps the
//! decoded colour type so PNG→PNG is lossless. WebP is written lossless, the
//! only mode the `image` crate's encoder offers, as RGB8 or RGBA8.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

use crate::error::ConvertError;
use crate::format::Format;

/// Encode `img` as `target`.
pub fn encode(img: &DynamicImage, target: Format, quality: u8) -> Result<Vec<u8>, ConvertError> {
    let fail = |e: image::ImageError| ConvertError::EncodeFailure {
        format: target,
        detail: e.to_string(),
    };
    let mut buf = Vec::new();
    match target {
        Format::Jpeg => {
            let rgb = img.to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder).map_err(fail)?;
        }
        Format::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
                .map_err(fail)?;
        }
        Format::Webp => {
            let encoder = WebPEncoder::new_lossless(&mut buf);
            if img.color().has_alpha() {
                img.to_rgba8().write_with_encoder(encoder).map_err(fail)?;
            } else {
                img.to_rgb8().write_with_encoder(encoder).map_err(fail)?;
            }
        }
        Format::Heic | Format::Avif | Format::Pdf => {
            return Err(ConvertError::EncodeFailure {
                format: target,
                detail: "not a raster output format".into(),
            })
        }
    }
    debug!(format = %target, bytes = buf.len(), "encoded image");
    Ok(buf)
}
