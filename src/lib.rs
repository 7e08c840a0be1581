//! # mediaconv
//!
//! Convert images and PDFs between formats: JPEG, PNG and WebP in-process,
//! HEIC and AVIF through ImageMagick and ffmpeg, many images into one PDF,
//! and a PDF page back out to an image.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ConversionRequest (payloads + endpoint + target)
//!  │
//!  ├─ 1. Validate  extension in the endpoint's accepted set (optional sniff)
//!  ├─ 2. Resolve   (source, target) → Converter via the static registry
//!  ├─ 3. Convert   codec | PDF assembler | PDF rasteriser | external tool
//!  └─ 4. Result    bytes + MIME type + `converted.<ext>`
//! ```
//!
//! Every request carries a [`RequestContext`]: a UUID that tags the tracing
//! span and names scratch files, a cancellation token, and an observer.
//! Scratch files are owned by [`TempHandle`]s and are removed on every exit
//! path. External tools run from explicit argument vectors with a hard
//! timeout and are killed on timeout, cancellation, or drop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mediaconv::{convert, ConversionRequest, Endpoint, Payload, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pages = vec![
//!         Payload::from_path("scan-1.jpg").await?,
//!         Payload::from_path("scan-2.heic").await?,
//!     ];
//!     let request = ConversionRequest::new(Endpoint::ImageToPdf, pages);
//!     let result = convert(request, &PipelineConfig::default()).await?;
//!     std::fs::write(result.filename(), result.bytes())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mediaconv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! mediaconv = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime Dependencies
//!
//! | Conversion | Needs |
//! |------------|-------|
//! | JPEG/PNG/WebP ↔ each other, images → PDF | nothing |
//! | HEIC → image | ImageMagick (`magick` or `convert`) |
//! | AVIF → image | ffmpeg |
//! | PDF → image | PDFium shared library |
//!
//! [`tool_report`] lists what was found.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod request;
pub mod temp;
pub mod tool;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConfigError, PipelineConfig, PipelineConfigBuilder, ToolSpec};
pub use context::{ConversionObserver, NoopObserver, Observer, RequestContext, Stage};
pub use convert::{convert, convert_sync, Pipeline};
pub use error::{ConvertError, ErrorKind, ErrorResponse};
pub use format::{Endpoint, Format, TargetFormat};
pub use output::ConversionResult;
pub use registry::{Converter, ConverterDescriptor};
pub use request::{ConversionRequest, OutputOptions, Payload};
pub use temp::{TempHandle, TempSpace};
pub use tool::{tool_report, Tool, ToolInfo};
pub use tokio_util::sync::CancellationToken;
pub use uuid::Uuid;
