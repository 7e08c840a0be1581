//! Conversion result.

use serde::Serialize;
use std::fmt;

use crate::format::TargetFormat;

/// Bytes produced by a successful conversion, with the MIME type and a
/// suggested download filename.
#[derive(Clone, Serialize)]
pub struct ConversionResult {
    #[serde(skip)]
    bytes: Vec<u8>,
    mime_type: &'static str,
    filename: String,
    size: usize,
}

impl ConversionResult {
    pub(crate) fn new(bytes: Vec<u8>, target: TargetFormat) -> Self {
        Self {
            size: bytes.len(),
            mime_type: target.mime_type(),
            filename: target.download_name(),
            bytes,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl fmt::Debug for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionResult")
            .field("mime_type", &self.mime_type)
            .field("filename", &self.filename)
            .field("len", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_follows_target_spelling() {
        let r = ConversionResult::new(vec![1, 2, 3], TargetFormat::parse_lenient("jpeg"));
        assert_eq!(r.mime_type(), "image/jpeg");
        assert_eq!(r.filename(), "converted.jpeg");
        assert_eq!(r.len(), 3);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["filename"], "converted.jpeg");
        assert!(json.get("bytes").is_none());
    }
}
