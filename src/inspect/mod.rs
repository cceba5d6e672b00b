//! Tensor-container inspection
//!
//! Metadata-only readers for model checkpoint containers, emitting
//! tab-separated tensor listings. Only headers are read; tensor payloads
//! are never loaded.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BubbleBenchError, Result};

pub mod gguf;
pub mod safetensors;

/// Files in `dir` with the given extension, sorted by name
///
/// # Errors
///
/// Returns `IoError` if the directory cannot be listed.
pub fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| BubbleBenchError::IoError {
        message: format!("failed to list {}: {e}", dir.display()),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == extension) && path.is_file())
        .collect();
    files.sort();
    Ok(files)
}
