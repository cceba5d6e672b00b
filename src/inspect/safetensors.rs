//! Safetensors header reader
//!
//! Reads the 8-byte little-endian header length plus the JSON header of a
//! safetensors file; tensor payloads are never touched.
//!
//! Format reference: <https://github.com/huggingface/safetensors>

use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BubbleBenchError, Result};

/// Sanity cap on header sizes (a header is JSON metadata, not tensor data)
const MAX_HEADER_LEN: u64 = 256 * 1024 * 1024;

/// One tensor entry from a safetensors header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetensorsTensorInfo {
    /// Tensor name
    pub name: String,
    /// Data type string as stored (`F32`, `BF16`, `F8_E4M3`, ...)
    pub dtype: String,
    /// Shape (dimensions)
    pub shape: Vec<u64>,
}

/// JSON header entry (internal)
#[derive(Debug, Deserialize)]
struct HeaderEntry {
    dtype: String,
    shape: Vec<u64>,
}

/// Read all tensor entries from a safetensors stream, sorted by name
///
/// The optional `__metadata__` entry is skipped.
///
/// # Errors
///
/// Returns `FormatError` for a truncated or malformed header.
pub fn read_header<R: Read>(reader: &mut R) -> Result<Vec<SafetensorsTensorInfo>> {
    let mut len_buf = [0u8; 8];
    reader
        .read_exact(&mut len_buf)
        .map_err(|e| BubbleBenchError::FormatError {
            reason: format!("truncated safetensors header length: {e}"),
        })?;
    let header_len = u64::from_le_bytes(len_buf);
    if header_len > MAX_HEADER_LEN {
        return Err(BubbleBenchError::FormatError {
            reason: format!("safetensors header length {header_len} exceeds sanity cap"),
        });
    }

    let mut header = vec![0u8; header_len as usize];
    reader
        .read_exact(&mut header)
        .map_err(|e| BubbleBenchError::FormatError {
            reason: format!("truncated safetensors header: {e}"),
        })?;

    // serde_json's default map keeps keys sorted, matching the listing order.
    let entries: serde_json::Map<String, Value> =
        serde_json::from_slice(&header).map_err(|e| BubbleBenchError::FormatError {
            reason: format!("malformed safetensors header JSON: {e}"),
        })?;

    let mut tensors = Vec::with_capacity(entries.len());
    for (name, value) in entries {
        if name == "__metadata__" {
            continue;
        }
        let entry: HeaderEntry =
            serde_json::from_value(value).map_err(|e| BubbleBenchError::FormatError {
                reason: format!("malformed safetensors entry '{name}': {e}"),
            })?;
        tensors.push(SafetensorsTensorInfo {
            name,
            dtype: entry.dtype,
            shape: entry.shape,
        });
    }
    Ok(tensors)
}

/// TSV tensor listing for every `*.safetensors` file in `model_dir`
///
/// # Errors
///
/// Returns `IoError` for unreadable files and `FormatError` for malformed
/// headers.
pub fn list_dir(model_dir: &Path) -> Result<String> {
    let mut out = String::new();
    out.push_str("File\tTensorKey\tTensorShape\tTensorType\n");
    for path in super::files_with_extension(model_dir, "safetensors")? {
        let file = File::open(&path).map_err(|e| BubbleBenchError::IoError {
            message: format!("failed to open {}: {e}", path.display()),
        })?;
        let mut reader = BufReader::new(file);
        let tensors = read_header(&mut reader).map_err(|e| match e {
            BubbleBenchError::FormatError { reason } => BubbleBenchError::FormatError {
                reason: format!("{}: {reason}", path.display()),
            },
            other => other,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        for tensor in &tensors {
            writeln!(
                out,
                "{filename}\t{}\t{:?}\t{}",
                tensor.name, tensor.shape, tensor.dtype
            )
            .expect("string write cannot fail");
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_safetensors(header_json: &str) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(header_json.len() as u64).to_le_bytes());
        data.extend_from_slice(header_json.as_bytes());
        data
    }

    #[test]
    fn test_read_header_sorted_by_name() {
        let data = synthetic_safetensors(
            r#"{
                "model.embed.weight": {"dtype": "BF16", "shape": [4, 8], "data_offsets": [0, 64]},
                "__metadata__": {"format": "pt"},
                "lm_head.weight": {"dtype": "F32", "shape": [8], "data_offsets": [64, 96]}
            }"#,
        );
        let tensors = read_header(&mut data.as_slice()).unwrap();
        assert_eq!(tensors.len(), 2);
        assert_eq!(tensors[0].name, "lm_head.weight");
        assert_eq!(tensors[0].dtype, "F32");
        assert_eq!(tensors[1].name, "model.embed.weight");
        assert_eq!(tensors[1].shape, vec![4, 8]);
    }

    #[test]
    fn test_read_header_malformed_json() {
        let data = synthetic_safetensors("{ nope");
        let err = read_header(&mut data.as_slice()).unwrap_err();
        assert!(err.to_string().contains("malformed safetensors header"));
    }

    #[test]
    fn test_read_header_truncated() {
        let mut data = synthetic_safetensors(r#"{"a": {"dtype": "F32", "shape": [1]}}"#);
        data.truncate(10);
        let err = read_header(&mut data.as_slice()).unwrap_err();
        assert!(err.to_string().contains("truncated safetensors header"));
    }

    #[test]
    fn test_read_header_length_sanity_cap() {
        let mut data = Vec::new();
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        let err = read_header(&mut data.as_slice()).unwrap_err();
        assert!(err.to_string().contains("sanity cap"));
    }

    #[test]
    fn test_list_dir_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let data = synthetic_safetensors(
            r#"{"w": {"dtype": "F8_E4M3", "shape": [2, 2], "data_offsets": [0, 4]}}"#,
        );
        std::fs::write(dir.path().join("model-00001.safetensors"), data).unwrap();
        let out = list_dir(dir.path()).unwrap();
        assert!(out.starts_with("File\tTensorKey\tTensorShape\tTensorType\n"));
        assert!(out.contains("model-00001.safetensors\tw\t[2, 2]\tF8_E4M3"));
    }

    #[test]
    fn test_list_dir_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let out = list_dir(dir.path()).unwrap();
        assert_eq!(out.lines().count(), 1);
    }
}
