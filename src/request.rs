//! Inbound request types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::ConvertError;
use crate::format::{Endpoint, TargetFormat};

/// One uploaded file: the declared name and its bytes.
///
/// The declared name is the only source of the format; see
/// [`crate::validate::validate`].
#[derive(Clone)]
pub struct Payload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Payload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a payload from disk, keeping only the file name component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ConvertError::io(format!("reading '{}'", path.display()), e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { filename, bytes })
    }

    /// Text after the last `.` of the declared name, if any.
    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.filename)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub(crate) fn extension_of(filename: &str) -> Option<&str> {
    let (_, ext) = filename.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

/// Per-request output tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOptions {
    /// JPEG quality override (1–100). Falls back to the pipeline config.
    pub quality: Option<u8>,
    /// 1-indexed PDF page to rasterise. Defaults to the first page.
    pub page: Option<usize>,
}

/// A conversion request: what came in, where it came in, and what is wanted.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub endpoint: Endpoint,
    pub payloads: Vec<Payload>,
    /// Client-chosen target. `None` uses the endpoint default.
    pub target: Option<TargetFormat>,
    pub options: OutputOptions,
}

impl ConversionRequest {
    pub fn new(endpoint: Endpoint, payloads: Vec<Payload>) -> Self {
        Self {
            endpoint,
            payloads,
            target: None,
            options: OutputOptions::default(),
        }
    }

    /// Single-payload request.
    pub fn single(endpoint: Endpoint, payload: Payload) -> Self {
        Self::new(endpoint, vec![payload])
    }

    pub fn with_target(mut self, target: TargetFormat) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the target from a client string, see [`TargetFormat::parse_lenient`].
    pub fn with_target_str(self, target: &str) -> Self {
        self.with_target(TargetFormat::parse_lenient(target))
    }

    pub fn with_options(mut self, options: OutputOptions) -> Self {
        self.options = options;
        self
    }

    /// The target actually used: fixed by the endpoint, else chosen, else default.
    pub fn effective_target(&self) -> TargetFormat {
        self.endpoint
            .fixed_target()
            .or(self.target)
            .unwrap_or_else(|| self.endpoint.default_target())
    }

    /// Reject the request if any payload is larger than `max` bytes.
    pub fn check_size(&self, max: usize) -> Result<(), ConvertError> {
        match self.payloads.iter().find(|p| p.len() > max) {
            Some(p) => Err(ConvertError::PayloadTooLarge {
                filename: p.filename.clone(),
                size: p.len(),
                limit: max,
            }),
            None => Ok(()),
        }
    }

    /// Total payload bytes.
    pub fn total_bytes(&self) -> usize {
        self.payloads.iter().map(Payload::len).sum()
    }
}
