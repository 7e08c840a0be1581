//! Error types for the mediaconv library.
//!
//! Every failure a conversion can hit is a [`ConvertError`]. Each variant
//! carries structured detail (offending filename, tool name, captured stderr)
//! and maps onto a small, closed [`ErrorKind`] taxonomy. The transport shell
//! only ever needs the kind to pick a status code; humans get the `Display`
//! text.
//!
//! Client-side problems (bad extension, nothing uploaded, a pair of formats we
//! cannot convert between) are 4xx-class. Everything that goes wrong after a
//! converter has started is 5xx-class, including tool failures and timeouts.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::format::Format;

/// Longest stderr excerpt kept in an error message.
const STDERR_LIMIT: usize = 4096;

/// All errors returned by the conversion pipeline.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Client errors ─────────────────────────────────────────────────────
    /// The declared filename has no extension, or its extension is not
    /// accepted by the endpoint.
    #[error("Invalid file format for '{filename}'. Allowed: {allowed}")]
    InvalidFormat { filename: String, allowed: String },

    /// The declared extension is accepted but the bytes say otherwise.
    /// Only raised when content verification is enabled.
    #[error("'{filename}' is named as {declared} but its content looks like {detected}")]
    ContentMismatch {
        filename: String,
        declared: Format,
        detected: String,
    },

    /// The request carried no payloads, or a payload with zero bytes.
    #[error("{}", empty_input_message(.filename))]
    EmptyInput { filename: Option<String> },

    /// No converter exists for the (source, target) pair.
    #[error("Cannot convert {from} to {to}")]
    UnsupportedConversion { from: Format, to: Format },

    /// The converter exists but cannot take this many inputs.
    #[error("{converter} converts one file at a time, got {count}")]
    TooManyInputs { converter: &'static str, count: usize },

    /// A payload exceeds the configured size cap.
    #[error("'{filename}' is {size} bytes, above the {limit} byte limit")]
    PayloadTooLarge {
        filename: String,
        size: usize,
        limit: usize,
    },

    // ── Converter errors ──────────────────────────────────────────────────
    /// The payload could not be decoded despite a valid extension.
    #[error("Error processing file {filename}: {detail}")]
    DecodeFailure { filename: String, detail: String },

    /// Encoding the converted image into the target format failed.
    #[error("Failed to encode {format}: {detail}")]
    EncodeFailure { format: Format, detail: String },

    /// An external tool exited with a non-zero status.
    #[error("{tool} exited with {status}: {stderr}")]
    ExternalToolFailure {
        tool: String,
        status: String,
        stderr: String,
    },

    /// An external tool ran past its deadline and was killed.
    #[error("{tool} timed out after {}s and was terminated", .after.as_secs_f32())]
    Timeout { tool: String, after: Duration },

    /// A required binary or library could not be located.
    #[error("{name} is not available: {hint}")]
    MissingDependency { name: String, hint: String },

    /// The caller cancelled the request before it finished.
    #[error("Conversion cancelled")]
    Cancelled,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Scratch-file or process I/O failed.
    #[error("I/O failure while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A scratch path could not be created under the temp root.
    #[error("Cannot allocate scratch file in '{}': {source}", .root.display())]
    TempAllocation {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A blocking worker panicked or was aborted.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Closed classification of [`ConvertError`] used by transport shells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidFormat,
    EmptyInput,
    UnsupportedConversion,
    PayloadTooLarge,
    DecodeFailure,
    ExternalToolFailure,
    Timeout,
    IoFailure,
    Cancelled,
}

impl ErrorKind {
    /// Suggested HTTP status for a response carrying this kind.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InvalidFormat | ErrorKind::EmptyInput | ErrorKind::UnsupportedConversion => {
                400
            }
            ErrorKind::PayloadTooLarge => 413,
            // nginx's "client closed request"
            ErrorKind::Cancelled => 499,
            ErrorKind::DecodeFailure
            | ErrorKind::ExternalToolFailure
            | ErrorKind::Timeout
            | ErrorKind::IoFailure => 500,
        }
    }

    /// Stable snake_case identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidFormat => "invalid_format",
            ErrorKind::EmptyInput => "empty_input",
            ErrorKind::UnsupportedConversion => "unsupported_conversion",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::DecodeFailure => "decode_failure",
            ErrorKind::ExternalToolFailure => "external_tool_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::IoFailure => "io_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// True for kinds the client caused (4xx).
    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConvertError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::InvalidFormat { .. } | ConvertError::ContentMismatch { .. } => {
                ErrorKind::InvalidFormat
            }
            ConvertError::EmptyInput { .. } => ErrorKind::EmptyInput,
            ConvertError::UnsupportedConversion { .. } | ConvertError::TooManyInputs { .. } => {
                ErrorKind::UnsupportedConversion
            }
            ConvertError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            ConvertError::DecodeFailure { .. } | ConvertError::EncodeFailure { .. } => {
                ErrorKind::DecodeFailure
            }
            ConvertError::ExternalToolFailure { .. } | ConvertError::MissingDependency { .. } => {
                ErrorKind::ExternalToolFailure
            }
            ConvertError::Timeout { .. } => ErrorKind::Timeout,
            ConvertError::Cancelled => ErrorKind::Cancelled,
            ConvertError::Io { .. }
            | ConvertError::TempAllocation { .. }
            | ConvertError::Internal(_) => ErrorKind::IoFailure,
        }
    }

    /// Suggested HTTP status, see [`ErrorKind::http_status`].
    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ConvertError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn decode(filename: impl Into<String>, detail: impl ToString) -> Self {
        ConvertError::DecodeFailure {
            filename: filename.into(),
            detail: detail.to_string(),
        }
    }

    /// Build a tool failure, keeping only the tail of a long stderr.
    pub(crate) fn tool_failure(tool: impl Into<String>, status: impl ToString, stderr: &str) -> Self {
        ConvertError::ExternalToolFailure {
            tool: tool.into(),
            status: status.to_string(),
            stderr: truncate_stderr(stderr),
        }
    }
}

fn empty_input_message(filename: &Option<String>) -> String {
    match filename {
        Some(name) => format!("File '{name}' is empty"),
        None => "No file selected for uploading".to_string(),
    }
}

/// Keep the last [`STDERR_LIMIT`] bytes of `stderr`, on a char boundary.
fn truncate_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_LIMIT {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_LIMIT;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &trimmed[start..])
}

/// Serializable failure payload handed to transport shells.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
}

impl From<&ConvertError> for ErrorResponse {
    fn from(err: &ConvertError) -> Self {
        let kind = err.kind();
        Self {
            kind,
            message: err.to_string(),
            status: kind.http_status(),
        }
    }
}
