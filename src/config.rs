//! Configuration for the conversion pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built through
//! [`PipelineConfigBuilder`]. A config is immutable once built and is shared
//! between concurrent requests behind an `Arc`, so nothing in here may be
//! mutated at request time.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by [`PipelineConfigBuilder::build`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How to invoke one external tool.
///
/// `leading_args` are placed before the input and output paths, so the
/// final argument vector is `program leading_args… <input> <output>` for
/// ImageMagick and `program leading_args… -i <input> <output>` for ffmpeg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub leading_args: Vec<OsString>,
}

impl ToolSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Configuration for a [`crate::Pipeline`].
///
/// # Example
/// ```rust
/// use mediaconv::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig::builder()
///     .tool_timeout(Duration::from_secs(30))
///     .jpeg_quality(85)
///     .build()
///     .unwrap();
/// assert_eq!(config.jpeg_quality, 85);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Hard deadline for a single external tool run. Default: 120 s.
    ///
    /// The child process is killed when the deadline passes and the request
    /// fails with a timeout.
    #[serde(rename = "tool_timeout_ms", with = "duration_millis")]
    pub tool_timeout: Duration,

    /// ImageMagick invocation. `None` discovers `magick`, then legacy
    /// `convert`, on `PATH`.
    pub imagemagick: Option<ToolSpec>,

    /// ffmpeg invocation. `None` discovers `ffmpeg` on `PATH`.
    pub ffmpeg: Option<ToolSpec>,

    /// Path to a PDFium shared library. `None` tries `PDFIUM_LIB_PATH`,
    /// then the platform's system library.
    pub pdfium_library: Option<PathBuf>,

    /// Root for scratch files. Default: the OS temp directory.
    pub temp_dir: PathBuf,

    /// Rasterisation DPI for PDF pages. Range: 36–600. Default: 200.
    pub render_dpi: u32,

    /// Cap on either dimension of a rendered PDF page, in pixels. Default: 10 000.
    pub max_render_pixels: u32,

    /// JPEG quality used when a request does not set one. Range: 1–100. Default: 90.
    pub jpeg_quality: u8,

    /// Opaque colour alpha is flattened onto for targets without alpha. Default: white.
    pub background: [u8; 3],

    /// Check magic bytes against the declared extension. Default: false.
    pub verify_content: bool,

    /// Largest accepted payload, in bytes. Default: 64 MiB.
    pub max_input_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(120),
            imagemagick: None,
            ffmpeg: None,
            pdfium_library: None,
            temp_dir: std::env::temp_dir(),
            render_dpi: 200,
            max_render_pixels: 10_000,
            jpeg_quality: 90,
            background: [255, 255, 255],
            verify_content: false,
            max_input_bytes: 64 * 1024 * 1024,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.tool_timeout = timeout;
        self
    }

    pub fn imagemagick(mut self, spec: ToolSpec) -> Self {
        self.config.imagemagick = Some(spec);
        self
    }

    pub fn ffmpeg(mut self, spec: ToolSpec) -> Self {
        self.config.ffmpeg = Some(spec);
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(36, 600);
        self
    }

    pub fn max_render_pixels(mut self, px: u32) -> Self {
        self.config.max_render_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn background(mut self, rgb: [u8; 3]) -> Self {
        self.config.background = rgb;
        self
    }

    pub fn verify_content(mut self, v: bool) -> Self {
        self.config.verify_content = v;
        self
    }

    pub fn max_input_bytes(mut self, bytes: usize) -> Self {
        self.config.max_input_bytes = bytes;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let c = &self.config;
        if c.tool_timeout.is_zero() {
            return Err(ConfigError::Invalid("tool timeout must be > 0".into()));
        }
        if c.max_input_bytes == 0 {
            return Err(ConfigError::Invalid("max input size must be > 0".into()));
        }
        if c.temp_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("temp dir must not be empty".into()));
        }
        for spec in [&c.imagemagick, &c.ffmpeg].into_iter().flatten() {
            if spec.program.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("tool program must not be empty".into()));
            }
        }
        Ok(self.config)
    }
}

/// (De)serialise a non-zero `Duration` as whole milliseconds.
mod duration_millis {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis().max(1) as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match u64::deserialize(deserializer)? {
            0 => Err(D::Error::custom("tool_timeout_ms must be greater than zero")),
            ms => Ok(Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.tool_timeout, Duration::from_secs(120));
        assert_eq!(c.render_dpi, 200);
        assert_eq!(c.background, [255, 255, 255]);
        assert!(!c.verify_content);
    }

    #[test]
    fn builder_clamps() {
        let c = PipelineConfig::builder()
            .render_dpi(5000)
            .jpeg_quality(0)
            .max_render_pixels(1)
            .build()
            .unwrap();
        assert_eq!(c.render_dpi, 600);
        assert_eq!(c.jpeg_quality, 1);
        assert_eq!(c.max_render_pixels, 100);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = PipelineConfig::builder()
            .tool_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn empty_tool_program_rejected() {
        assert!(PipelineConfig::builder()
            .ffmpeg(ToolSpec::new(""))
            .build()
            .is_err());
    }

    #[test]
    fn sub_second_timeout_survives_round_trip() {
        let c = PipelineConfig::builder()
            .tool_timeout(Duration::from_millis(300))
            .build()
            .unwrap();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["tool_timeout_ms"], 300);
        let back: PipelineConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.tool_timeout, Duration::from_millis(300));
    }

    #[test]
    fn zero_timeout_rejected_on_deserialize() {
        let mut json = serde_json::to_value(PipelineConfig::default()).unwrap();
        json["tool_timeout_ms"] = 0.into();
        let err = serde_json::from_value::<PipelineConfig>(json).unwrap_err();
        assert!(err.to_string().contains("tool_timeout_ms"), "got: {err}");
    }
}
