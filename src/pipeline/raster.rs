//! In-process raster conversion through the `image` crate.

use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::error::ConvertError;
use crate::format::{Format, TargetFormat};
use crate::request::Payload;

use super::encode::encode;

/// Decode `payload` as `format` (JPEG, PNG or WebP).
pub fn decode(payload: &Payload, format: Format) -> Result<DynamicImage, ConvertError> {
    let codec = format
        .image_format()
        .ok_or_else(|| ConvertError::decode(&payload.filename, format!("{format} is not decoded in-process")))?;
    let img = image::load_from_memory_with_format(&payload.bytes, codec)
        .map_err(|e| ConvertError::decode(&payload.filename, e))?;
    debug!(
        file = %payload.filename,
        width = img.width(),
        height = img.height(),
        color = ?img.color(),
        "decoded image"
    );
    Ok(img)
}

/// Composite any alpha channel over an opaque `background`.
///
/// Images without alpha are returned untouched. The arithmetic is integer
/// only, so the same input always yields the same pixels.
pub fn flatten_alpha(img: DynamicImage, background: [u8; 3]) -> DynamicImage {
    if !img.color().has_alpha() {
        return img;
    }
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut out = RgbImage::new(w, h);
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let a = u32::from(src[3]);
        for c in 0..3 {
            let fg = u32::from(src[c]);
            let bg = u32::from(background[c]);
            dst[c] = ((fg * a + bg * (255 - a) + 127) / 255) as u8;
        }
    }
    DynamicImage::ImageRgb8(out)
}

/// Flatten alpha only when `target` cannot carry it.
pub fn prepare_for(img: DynamicImage, target: Format, background: [u8; 3]) -> DynamicImage {
    if target.supports_alpha() {
        img
    } else {
        flatten_alpha(img, background)
    }
}

/// Decode, normalise for the target, and re-encode.
pub fn image_to_image(
    payload: &Payload,
    source: Format,
    target: TargetFormat,
    quality: u8,
    background: [u8; 3],
) -> Result<Vec<u8>, ConvertError> {
    let img = decode(payload, source)?;
    let img = prepare_for(img, target.format, background);
    encode(&img, target.format, quality)
}

/// Re-encode already-decoded PNG bytes (external tool output) into `target`.
pub fn transcode_png(
    png: &[u8],
    origin: &str,
    target: TargetFormat,
    quality: u8,
    background: [u8; 3],
) -> Result<Vec<u8>, ConvertError> {
    if target.format == Format::Png {
        return Ok(png.to_vec());
    }
    let img = image::load_from_memory_with_format(png, image::ImageFormat::Png)
        .map_err(|e| ConvertError::decode(origin, e))?;
    let img = prepare_for(img, target.format, background);
    encode(&img, target.format, quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png).unwrap();
        buf
    }

    fn gradient_rgba(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 13) as u8, (y * 7) as u8, 200, ((x + y) * 9) as u8])
        }))
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let src = gradient_rgba(17, 9);
        let payload = Payload::new("g.png", png_bytes(&src));
        let out = image_to_image(&payload, Format::Png, TargetFormat::new(Format::Png), 90, [255; 3]).unwrap();
        let back = image::load_from_memory(&out).unwrap();
        assert_eq!(back.to_rgba8(), src.to_rgba8());
    }

    #[test]
    fn alpha_to_jpeg_drops_alpha_deterministically() {
        let payload = Payload::new("g.png", png_bytes(&gradient_rgba(32, 32)));
        let target = TargetFormat::new(Format::Jpeg);
        let a = image_to_image(&payload, Format::Png, target, 85, [255; 3]).unwrap();
        let b = image_to_image(&payload, Format::Png, target, 85, [255; 3]).unwrap();
        assert_eq!(a, b);
        let decoded = image::load_from_memory(&a).unwrap();
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn flatten_uses_background() {
        let clear = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0])));
        let flat = flatten_alpha(clear, [10, 20, 30]).to_rgb8();
        assert_eq!(flat.get_pixel(0, 0).0, [10, 20, 30]);

        let opaque = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 255])));
        assert_eq!(flatten_alpha(opaque, [255; 3]).to_rgb8().get_pixel(0, 0).0, [1, 2, 3]);
    }

    #[test]
    fn png_to_webp_keeps_alpha() {
        let payload = Payload::new("g.png", png_bytes(&gradient_rgba(8, 8)));
        let out = image_to_image(&payload, Format::Png, TargetFormat::new(Format::Webp), 90, [255; 3]).unwrap();
        let back = image::load_from_memory_with_format(&out, image::ImageFormat::WebP).unwrap();
        assert!(back.color().has_alpha());
    }

    #[test]
    fn garbage_with_valid_extension_is_decode_failure() {
        let payload = Payload::new("photo.jpg", b"definitely not a jpeg".to_vec());
        let err = image_to_image(&payload, Format::Jpeg, TargetFormat::new(Format::Png), 90, [255; 3])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailure);
        assert!(err.to_string().contains("photo.jpg"));
    }

    #[test]
    fn transcode_png_passes_png_through() {
        let png = png_bytes(&gradient_rgba(3, 3));
        let out = transcode_png(&png, "x.heic", TargetFormat::new(Format::Png), 90, [255; 3]).unwrap();
        assert_eq!(out, png);
        let jpg = transcode_png(&png, "x.heic", TargetFormat::new(Format::Jpeg), 90, [255; 3]).unwrap();
        assert_eq!(image::guess_format(&jpg).unwrap(), image::ImageFormat::Jpeg);
    }
}
