//! Static table mapping (source, target) format pairs to converters.
//!
//! Built once per process behind a `Lazy` and only ever read afterwards, so
//! concurrent requests resolve without locking.

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::ConvertError;
use crate::format::{Format, TargetFormat};
use crate::tool::Tool;

/// The closed set of conversion strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Converter {
    /// In-process decode/encode through the `image` crate.
    ImageCodec,
    /// One or more images assembled into a multi-page PDF.
    PdfAssembler,
    /// A single PDF page rendered through PDFium.
    PdfRaster,
    /// A child process produces PNG, re-encoded in-process if needed.
    External(Tool),
}

impl Converter {
    pub fn name(self) -> &'static str {
        match self {
            Converter::ImageCodec => "image-codec",
            Converter::PdfAssembler => "pdf-assembler",
            Converter::PdfRaster => "pdf-raster",
            Converter::External(Tool::ImageMagick) => "imagemagick",
            Converter::External(Tool::Ffmpeg) => "ffmpeg",
        }
    }

    pub fn accepts_many(self) -> bool {
        matches!(self, Converter::PdfAssembler)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    InProcess,
    ExternalProcess,
}

/// What a binary or library a converter depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Tool(Tool),
    Pdfium,
}

/// One row of the registry.
#[derive(Debug, Clone, Serialize)]
pub struct ConverterDescriptor {
    pub sources: &'static [Format],
    pub targets: &'static [Format],
    pub converter: Converter,
    pub strategy: Strategy,
    pub requires: &'static [Requirement],
}

impl ConverterDescriptor {
    fn handles(&self, source: Format, target: Format) -> bool {
        self.sources.contains(&source) && self.targets.contains(&target)
    }
}

const CODEC_FORMATS: &[Format] = &[Format::Jpeg, Format::Png, Format::Webp];
const RASTER_SOURCES: &[Format] = &[
    Format::Jpeg,
    Format::Png,
    Format::Webp,
    Format::Heic,
    Format::Avif,
];
const EXTERNAL_TARGETS: &[Format] = &[Format::Png, Format::Jpeg, Format::Webp];

static REGISTRY: Lazy<Vec<ConverterDescriptor>> = Lazy::new(|| {
    vec![
        ConverterDescriptor {
            sources: CODEC_FORMATS,
            targets: CODEC_FORMATS,
            converter: Converter::ImageCodec,
            strategy: Strategy::InProcess,
            requires: &[],
        },
        ConverterDescriptor {
            sources: RASTER_SOURCES,
            targets: &[Format::Pdf],
            converter: Converter::PdfAssembler,
            strategy: Strategy::InProcess,
            // HEIC/AVIF pages are decoded through the external tools first.
            requires: &[],
        },
        ConverterDescriptor {
            sources: &[Format::Pdf],
            targets: &[Format::Png, Format::Jpeg],
            converter: Converter::PdfRaster,
            strategy: Strategy::InProcess,
            requires: &[Requirement::Pdfium],
        },
        ConverterDescriptor {
            sources: &[Format::Heic],
            targets: EXTERNAL_TARGETS,
            converter: Converter::External(Tool::ImageMagick),
            strategy: Strategy::ExternalProcess,
            requires: &[Requirement::Tool(Tool::ImageMagick)],
        },
        ConverterDescriptor {
            sources: &[Format::Avif],
            targets: EXTERNAL_TARGETS,
            converter: Converter::External(Tool::Ffmpeg),
            strategy: Strategy::ExternalProcess,
            requires: &[Requirement::Tool(Tool::Ffmpeg)],
        },
    ]
});

/// Every registered converter.
pub fn descriptors() -> &'static [ConverterDescriptor] {
    &REGISTRY
}

/// Find the converter for `source → target`.
///
/// The target may be adjusted: the PDF rasteriser only emits PNG or JPEG and
/// quietly maps any other raster target to JPEG.
pub fn resolve(
    source: Format,
    target: TargetFormat,
) -> Result<(&'static ConverterDescriptor, TargetFormat), ConvertError> {
    let target = if source == Format::Pdf {
        target.raster_only()
    } else {
        target
    };
    REGISTRY
        .iter()
        .find(|d| d.handles(source, target.format))
        .map(|d| (d, target))
        .ok_or(ConvertError::UnsupportedConversion {
            from: source,
            to: target.format,
        })
}

/// The external tool that decodes `source`, for formats the `image` crate
/// cannot read.
pub fn external_decoder(source: Format) -> Option<Tool> {
    REGISTRY.iter().find_map(|d| match d.converter {
        Converter::External(tool) if d.sources.contains(&source) => Some(tool),
        _ => None,
    })
}
