//! Media formats, requested targets, and the endpoints that accept them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A media format the pipeline knows how to name.
///
/// Not every format is valid in every position: HEIC and AVIF are
/// source-only, PDF is produced by the assembler and consumed by the
/// rasteriser. The [`crate::registry`] decides which pairs are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Jpeg,
    Png,
    Webp,
    Heic,
    Avif,
    Pdf,
}

impl Format {
    pub const ALL: [Format; 6] = [
        Format::Jpeg,
        Format::Png,
        Format::Webp,
        Format::Heic,
        Format::Avif,
        Format::Pdf,
    ];

    /// Map a bare extension (no dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Format::Jpeg),
            "png" => Some(Format::Png),
            "webp" => Some(Format::Webp),
            "heic" => Some(Format::Heic),
            "avif" => Some(Format::Avif),
            "pdf" => Some(Format::Pdf),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Format::Jpeg => "image/jpeg",
            Format::Png => "image/png",
            Format::Webp => "image/webp",
            Format::Heic => "image/heic",
            Format::Avif => "image/avif",
            Format::Pdf => "application/pdf",
        }
    }

    /// Canonical file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Jpeg => "jpg",
            Format::Png => "png",
            Format::Webp => "webp",
            Format::Heic => "heic",
            Format::Avif => "avif",
            Format::Pdf => "pdf",
        }
    }

    /// Whether an encoded file of this format can carry an alpha channel.
    pub fn supports_alpha(self) -> bool {
        matches!(self, Format::Png | Format::Webp | Format::Heic | Format::Avif)
    }

    /// The `image` crate codec for formats we decode and encode in-process.
    pub fn image_format(self) -> Option<image::ImageFormat> {
        match self {
            Format::Jpeg => Some(image::ImageFormat::Jpeg),
            Format::Png => Some(image::ImageFormat::Png),
            Format::Webp => Some(image::ImageFormat::WebP),
            Format::Heic | Format::Avif | Format::Pdf => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Jpeg => "JPEG",
            Format::Png => "PNG",
            Format::Webp => "WEBP",
            Format::Heic => "HEIC",
            Format::Avif => "AVIF",
            Format::Pdf => "PDF",
        };
        f.write_str(name)
    }
}

/// The output a client asked for, with the extension spelling it used.
///
/// `jpeg` and `jpg` both mean JPEG but produce `converted.jpeg` and
/// `converted.jpg` respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetFormat {
    pub format: Format,
    extension: &'static str,
}

impl TargetFormat {
    pub const fn new(format: Format) -> Self {
        let extension = match format {
            Format::Jpeg => "jpg",
            Format::Png => "png",
            Format::Webp => "webp",
            Format::Heic => "heic",
            Format::Avif => "avif",
            Format::Pdf => "pdf",
        };
        Self { format, extension }
    }

    /// Parse a client-supplied format string.
    ///
    /// Unknown strings fall back to JPEG with a `jpg` extension.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" => Self {
                format: Format::Jpeg,
                extension: "jpeg",
            },
            other => Format::from_extension(other)
                .map(Self::new)
                .unwrap_or(Self::new(Format::Jpeg)),
        }
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Suggested download filename for a result in this format.
    pub fn download_name(&self) -> String {
        format!("converted.{}", self.extension)
    }

    /// Raster targets outside PNG/JPEG collapse to JPEG (PDF rasteriser rule).
    pub(crate) fn raster_only(self) -> Self {
        match self.format {
            Format::Png | Format::Jpeg => self,
            _ => Self::new(Format::Jpeg),
        }
    }
}

impl Default for TargetFormat {
    fn default() -> Self {
        Self::new(Format::Jpeg)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension)
    }
}

/// A logical conversion entry point and the extensions it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Endpoint {
    /// One or more images assembled into a single PDF.
    ImageToPdf,
    /// First page of a PDF rendered to PNG or JPEG.
    PdfToImage,
    WebpToImage,
    HeicToImage,
    AvifToImage,
    /// Any supported raster image to another raster format.
    Image,
}

const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "avif", "heic"];

impl Endpoint {
    pub fn accepted_extensions(self) -> &'static [&'static str] {
        match self {
            Endpoint::ImageToPdf | Endpoint::Image => RASTER_EXTENSIONS,
            Endpoint::PdfToImage => &["pdf"],
            Endpoint::WebpToImage => &["webp"],
            Endpoint::HeicToImage => &["heic"],
            Endpoint::AvifToImage => &["avif"],
        }
    }

    /// The target used when the client does not choose one.
    pub fn default_target(self) -> TargetFormat {
        match self {
            Endpoint::ImageToPdf => TargetFormat::new(Format::Pdf),
            _ => TargetFormat::new(Format::Jpeg),
        }
    }

    /// Whether the endpoint fixes its target regardless of client choice.
    pub fn fixed_target(self) -> Option<TargetFormat> {
        match self {
            Endpoint::ImageToPdf => Some(TargetFormat::new(Format::Pdf)),
            _ => None,
        }
    }

    /// Whether the endpoint takes more than one payload per request.
    pub fn accepts_many(self) -> bool {
        matches!(self, Endpoint::ImageToPdf)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::ImageToPdf => "image-to-pdf",
            Endpoint::PdfToImage => "pdf-to-image",
            Endpoint::WebpToImage => "webp-to-image",
            Endpoint::HeicToImage => "heic-to-image",
            Endpoint::AvifToImage => "avif-to-image",
            Endpoint::Image => "image",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
