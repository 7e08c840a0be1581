//! Extension validation and optional content sniffing.

use crate::error::ConvertError;
use crate::format::Format;
use crate::request::{extension_of, Payload};

/// Check that `filename`'s extension is one of `accepted` and return its format.
///
/// The extension is the text after the last `.`, compared case-insensitively.
/// Content is never inspected here.
pub fn validate(filename: &str, accepted: &[&str]) -> Result<Format, ConvertError> {
    let invalid = || ConvertError::InvalidFormat {
        filename: filename.to_string(),
        allowed: accepted.join(", "),
    };
    let ext = extension_of(filename).ok_or_else(invalid)?;
    if !accepted.iter().any(|a| a.eq_ignore_ascii_case(ext)) {
        return Err(invalid());
    }
    Format::from_extension(ext).ok_or_else(invalid)
}

/// Guess a format from leading magic bytes.
pub fn sniff(bytes: &[u8]) -> Option<Format> {
    if bytes.starts_with(b"%PDF-") {
        return Some(Format::Pdf);
    }
    if let Some(f) = sniff_isobmff(bytes) {
        return Some(f);
    }
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Jpeg => Some(Format::Jpeg),
        image::ImageFormat::Png => Some(Format::Png),
        image::ImageFormat::WebP => Some(Format::Webp),
        _ => None,
    }
}

/// HEIF-family containers: `....ftyp<major><minor><compatible…>`.
fn sniff_isobmff(bytes: &[u8]) -> Option<Format> {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return None;
    }
    let box_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let end = box_len.clamp(12, bytes.len());
    let major = &bytes[8..12];
    let compatible = bytes.get(16..end).unwrap_or_default().chunks_exact(4);

    let brands = std::iter::once(major).chain(compatible);
    let mut heif = false;
    for brand in brands {
        match brand {
            b"avif" | b"avis" => return Some(Format::Avif),
            b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" | b"mif1" | b"msf1" => {
                heif = true
            }
            _ => {}
        }
    }
    heif.then_some(Format::Heic)
}

/// Confirm the payload's bytes look like the format its name declares.
pub fn verify_content(payload: &Payload, declared: Format) -> Result<(), ConvertError> {
    match sniff(&payload.bytes) {
        Some(found) if found == declared => Ok(()),
        found => Err(ConvertError::ContentMismatch {
            filename: payload.filename.clone(),
            declared,
            detected: found.map_or_else(|| "unknown data".to_string(), |f| f.to_string()),
        }),
    }
}
