//! Request-scoped scratch files.
//!
//! A [`TempSpace`] hands out [`TempHandle`]s under the configured temp root.
//! Each handle owns one file and removes it when dropped, so every exit path
//! (success, error, cancellation, unwinding) cleans up without help from the
//! caller. Names carry the process id and the request id plus a random
//! suffix from `tempfile`, so concurrent requests never race on a path.

use std::path::{Path, PathBuf};
use tempfile::TempPath;
use uuid::Uuid;

use crate::error::ConvertError;

/// Allocator for one request's scratch files.
#[derive(Debug, Clone)]
pub struct TempSpace {
    root: PathBuf,
    prefix: String,
}

impl TempSpace {
    pub fn new(root: impl Into<PathBuf>, request_id: Uuid) -> Self {
        let id = request_id.simple().to_string();
        Self {
            root: root.into(),
            prefix: format!("mediaconv-{}-{}-", std::process::id(), &id[..8]),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create an empty file ending in `suffix` (e.g. `".heic"`).
    pub fn allocate(&self, suffix: &str) -> Result<TempHandle, ConvertError> {
        let file = tempfile::Builder::new()
            .prefix(&self.prefix)
            .suffix(suffix)
            .tempfile_in(&self.root)
            .map_err(|source| ConvertError::TempAllocation {
                root: self.root.clone(),
                source,
            })?;
        Ok(TempHandle {
            path: file.into_temp_path(),
        })
    }

    /// Allocate a file and fill it with `bytes`.
    pub async fn write(&self, suffix: &str, bytes: &[u8]) -> Result<TempHandle, ConvertError> {
        let handle = self.allocate(suffix)?;
        handle.write(bytes).await?;
        Ok(handle)
    }
}

/// An owned scratch file, deleted exactly once when dropped or closed.
#[derive(Debug)]
pub struct TempHandle {
    path: TempPath,
}

impl TempHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, bytes: &[u8]) -> Result<(), ConvertError> {
        tokio::fs::write(&*self.path, bytes)
            .await
            .map_err(|e| ConvertError::io(format!("writing '{}'", self.path.display()), e))
    }

    pub async fn read(&self) -> Result<Vec<u8>, ConvertError> {
        tokio::fs::read(&*self.path)
            .await
            .map_err(|e| ConvertError::io(format!("reading '{}'", self.path.display()), e))
    }

    /// Delete now and report failure instead of ignoring it on drop.
    pub fn close(self) -> Result<(), ConvertError> {
        let shown = self.path.display().to_string();
        self.path
            .close()
            .map_err(|e| ConvertError::io(format!("removing '{shown}'"), e))
    }
}
