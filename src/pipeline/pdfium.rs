//! Locating and binding the PDFium shared library.
//!
//! Lookup order: the configured path, then `PDFIUM_LIB_PATH`, then the
//! platform's system library. A path may name the library file itself or
//! the directory holding it.

use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::ConvertError;
use crate::tool::ToolInfo;

const ENV_VAR: &str = "PDFIUM_LIB_PATH";

/// Where a bind attempt will look first, if anywhere explicit.
pub fn library_path(config: &PipelineConfig) -> Option<PathBuf> {
    config
        .pdfium_library
        .clone()
        .or_else(|| std::env::var_os(ENV_VAR).map(PathBuf::from))
        .map(|p| {
            if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            }
        })
}

/// Bind a fresh [`Pdfium`] instance. Call from a blocking thread.
pub fn bind(config: &PipelineConfig) -> Result<Pdfium, ConvertError> {
    let explicit = library_path(config);
    let bindings = match &explicit {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    };
    bindings.map(Pdfium::new).map_err(|e| {
        debug!(error = %e, path = ?explicit, "pdfium bind failed");
        ConvertError::MissingDependency {
            name: "pdfium".into(),
            hint: match &explicit {
                Some(path) => format!("cannot load '{}': {e}", path.display()),
                None => format!("no system PDFium library ({e}); set {ENV_VAR} or --pdfium-lib"),
            },
        }
    })
}

/// Availability entry for the tool report.
pub fn probe(config: &PipelineConfig) -> ToolInfo {
    let path = library_path(config);
    let available = bind(config).is_ok();
    ToolInfo {
        name: "pdfium".into(),
        available,
        path: path.filter(|_| available),
        version: None,
    }
}
