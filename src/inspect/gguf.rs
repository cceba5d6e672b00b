//! GGUF header and tensor-descriptor reader
//!
//! Parses just enough of a GGUF file to enumerate its tensors: magic,
//! version, counts, metadata keys (values skipped), and the tensor
//! descriptor table. Streams from a reader so multi-gigabyte files cost
//! only a header read.
//!
//! Format reference: <https://github.com/ggerganov/ggml/blob/master/docs/gguf.md>

use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{BubbleBenchError, Result};

/// GGUF magic bytes "GGUF" (little-endian)
pub const GGUF_MAGIC: u32 = 0x4655_4747;

/// Sanity cap on string lengths in headers
const MAX_STRING_LEN: u64 = 1 << 20;

// ============================================================================
// Tensor Descriptors
// ============================================================================

/// One tensor descriptor from the GGUF header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GgufTensorInfo {
    /// Dotted tensor name (e.g. `blk.0.attn_q.weight`)
    pub name: String,
    /// Dimension sizes
    pub dims: Vec<u64>,
    /// GGML quantization type id
    pub qtype: u32,
    /// Byte offset into the tensor data section
    pub offset: u64,
}

impl GgufTensorInfo {
    /// Total element count (product of dimensions; 1 for a scalar)
    #[must_use]
    pub fn n_elements(&self) -> u64 {
        self.dims.iter().product()
    }

    /// Human-readable GGML type name
    #[must_use]
    pub fn type_name(&self) -> String {
        ggml_type_name(self.qtype)
    }
}

/// Name for a GGML tensor type id
#[must_use]
pub fn ggml_type_name(qtype: u32) -> String {
    let name = match qtype {
        0 => "F32",
        1 => "F16",
        2 => "Q4_0",
        3 => "Q4_1",
        6 => "Q5_0",
        7 => "Q5_1",
        8 => "Q8_0",
        9 => "Q8_1",
        10 => "Q2_K",
        11 => "Q3_K",
        12 => "Q4_K",
        13 => "Q5_K",
        14 => "Q6_K",
        15 => "Q8_K",
        16 => "IQ2_XXS",
        17 => "IQ2_XS",
        18 => "IQ3_XXS",
        19 => "IQ1_S",
        20 => "IQ4_NL",
        21 => "IQ3_S",
        22 => "IQ2_S",
        23 => "IQ4_XS",
        24 => "I8",
        25 => "I16",
        26 => "I32",
        27 => "I64",
        28 => "F64",
        29 => "IQ1_M",
        30 => "BF16",
        other => return format!("UNKNOWN({other})"),
    };
    name.to_string()
}

// ============================================================================
// Header Parsing
// ============================================================================

/// Read all tensor descriptors from a GGUF stream
///
/// # Errors
///
/// Returns `FormatError` for an invalid magic, unsupported version, or
/// truncated/malformed header data.
pub fn read_tensor_infos<R: Read>(reader: &mut R) -> Result<Vec<GgufTensorInfo>> {
    let magic = read_u32(reader, "magic")?;
    if magic != GGUF_MAGIC {
        return Err(BubbleBenchError::FormatError {
            reason: format!("invalid GGUF magic: 0x{magic:08X}, expected 0x{GGUF_MAGIC:08X}"),
        });
    }
    let version = read_u32(reader, "version")?;
    if !(2..=3).contains(&version) {
        return Err(BubbleBenchError::FormatError {
            reason: format!("unsupported GGUF version: {version}"),
        });
    }
    let tensor_count = read_u64(reader, "tensor_count")?;
    let metadata_count = read_u64(reader, "metadata_count")?;

    // Metadata values are not needed for listing; skip them.
    for _ in 0..metadata_count {
        let _key = read_string(reader)?;
        let value_type = read_u32(reader, "metadata value type")?;
        skip_value(reader, value_type)?;
    }

    let mut tensors = Vec::with_capacity(usize::try_from(tensor_count).unwrap_or(0));
    for _ in 0..tensor_count {
        let name = read_string(reader)?;
        let n_dims = read_u32(reader, "tensor n_dims")?;
        let mut dims = Vec::with_capacity(n_dims as usize);
        for _ in 0..n_dims {
            dims.push(read_u64(reader, "tensor dim")?);
        }
        let qtype = read_u32(reader, "tensor qtype")?;
        let offset = read_u64(reader, "tensor offset")?;
        tensors.push(GgufTensorInfo {
            name,
            dims,
            qtype,
            offset,
        });
    }
    Ok(tensors)
}

fn read_u32<R: Read>(reader: &mut R, what: &str) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|e| BubbleBenchError::FormatError {
            reason: format!("truncated GGUF header reading {what}: {e}"),
        })?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R, what: &str) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader
        .read_exact(&mut buf)
        .map_err(|e| BubbleBenchError::FormatError {
            reason: format!("truncated GGUF header reading {what}: {e}"),
        })?;
    Ok(u64::from_le_bytes(buf))
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_u64(reader, "string length")?;
    if len > MAX_STRING_LEN {
        return Err(BubbleBenchError::FormatError {
            reason: format!("GGUF string length {len} exceeds sanity cap"),
        });
    }
    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .map_err(|e| BubbleBenchError::FormatError {
            reason: format!("truncated GGUF string: {e}"),
        })?;
    String::from_utf8(buf).map_err(|e| BubbleBenchError::FormatError {
        reason: format!("GGUF string is not UTF-8: {e}"),
    })
}

fn skip_bytes<R: Read>(reader: &mut R, n: u64) -> Result<()> {
    let copied = std::io::copy(&mut reader.take(n), &mut std::io::sink()).map_err(|e| {
        BubbleBenchError::FormatError {
            reason: format!("failed skipping GGUF metadata: {e}"),
        }
    })?;
    if copied != n {
        return Err(BubbleBenchError::FormatError {
            reason: format!("truncated GGUF metadata: expected {n} bytes, got {copied}"),
        });
    }
    Ok(())
}

/// Skip one metadata value of the given GGUF value type
fn skip_value<R: Read>(reader: &mut R, value_type: u32) -> Result<()> {
    match value_type {
        // u8, i8, bool
        0 | 1 | 7 => skip_bytes(reader, 1),
        // u16, i16
        2 | 3 => skip_bytes(reader, 2),
        // u32, i32, f32
        4 | 5 | 6 => skip_bytes(reader, 4),
        // string
        8 => {
            read_string(reader)?;
            Ok(())
        },
        // array: element type + length + elements
        9 => {
            let element_type = read_u32(reader, "array element type")?;
            let array_len = read_u64(reader, "array length")?;
            for _ in 0..array_len {
                skip_value(reader, element_type)?;
            }
            Ok(())
        },
        // u64, i64, f64
        10 | 11 | 12 => skip_bytes(reader, 8),
        other => Err(BubbleBenchError::FormatError {
            reason: format!("unknown GGUF metadata value type: {other}"),
        }),
    }
}

// ============================================================================
// Directory Listing
// ============================================================================

/// Suffix class used for the parameter-count summary
fn tensor_class(suffix: &str) -> &str {
    match suffix {
        "weight" | "bias" => "weight",
        "weight_scale_inv" => "scale",
        other => other,
    }
}

/// TSV tensor listing for every `*.gguf` file in `model_dir`
///
/// One row per tensor (file, key, element count, type, shape) followed by a
/// per-prefix parameter-count summary. Tensor names are split on `.`; the
/// summary aggregates every prefix up to `summary_depth` components (0 means
/// unlimited depth), keyed by the suffix class.
///
/// # Errors
///
/// Returns `IoError` for unreadable files and `FormatError` for malformed
/// GGUF headers.
pub fn list_dir(model_dir: &Path, summary_depth: usize) -> Result<String> {
    let mut out = String::new();
    out.push_str("File\tTensorKey\tTensorParams\tTensorType\tTensorShape\n");
    let mut summary: std::collections::BTreeMap<String, u64> = std::collections::BTreeMap::new();

    for path in super::files_with_extension(model_dir, "gguf")? {
        let file = File::open(&path).map_err(|e| BubbleBenchError::IoError {
            message: format!("failed to open {}: {e}", path.display()),
        })?;
        let mut reader = BufReader::new(file);
        let tensors = read_tensor_infos(&mut reader).map_err(|e| match e {
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
                "{filename}\t{}\t{}\t{}\t{:?}",
                tensor.name,
                tensor.n_elements(),
                tensor.type_name(),
                tensor.dims
            )
            .expect("string write cannot fail");

            let parts: Vec<&str> = tensor.name.split('.').collect();
            let class = tensor_class(parts[parts.len() - 1]);
            let depth = if summary_depth > 0 {
                parts.len().min(summary_depth + 1)
            } else {
                parts.len()
            };
            for i in 0..depth {
                let prefix = parts[..i].join(".");
                *summary.entry(format!("{class}[{prefix}]")).or_insert(0) +=
                    tensor.n_elements();
            }
        }
    }

    for (key, count) in &summary {
        writeln!(out, "Summary\t{key}\t{count}\t\t").expect("string write cannot fail");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal valid GGUF header with the given tensors
    fn synthetic_gguf(tensors: &[(&str, &[u64], u32)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&GGUF_MAGIC.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes()); // version
        data.extend_from_slice(&(tensors.len() as u64).to_le_bytes());
        data.extend_from_slice(&1u64.to_le_bytes()); // metadata count

        // One metadata entry: general.architecture = "llama"
        let key = b"general.architecture";
        data.extend_from_slice(&(key.len() as u64).to_le_bytes());
        data.extend_from_slice(key);
        data.extend_from_slice(&8u32.to_le_bytes()); // string type
        let value = b"llama";
        data.extend_from_slice(&(value.len() as u64).to_le_bytes());
        data.extend_from_slice(value);

        for (name, dims, qtype) in tensors {
            data.extend_from_slice(&(name.len() as u64).to_le_bytes());
            data.extend_from_slice(name.as_bytes());
            data.extend_from_slice(&(dims.len() as u32).to_le_bytes());
            for d in *dims {
                data.extend_from_slice(&d.to_le_bytes());
            }
            data.extend_from_slice(&qtype.to_le_bytes());
            data.extend_from_slice(&0u64.to_le_bytes()); // offset
        }
        data
    }

    #[test]
    fn test_read_tensor_infos_synthetic() {
        let data = synthetic_gguf(&[
            ("blk.0.attn_q.weight", &[4096, 4096], 12),
            ("output_norm.weight", &[4096], 0),
        ]);
        let tensors = read_tensor_infos(&mut data.as_slice()).unwrap();
        assert_eq!(tensors.len(), 2);
        assert_eq!(tensors[0].name, "blk.0.attn_q.weight");
        assert_eq!(tensors[0].n_elements(), 4096 * 4096);
        assert_eq!(tensors[0].type_name(), "Q4_K");
        assert_eq!(tensors[1].dims, vec![4096]);
        assert_eq!(tensors[1].type_name(), "F32");
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let mut data = synthetic_gguf(&[]);
        data[0] = 0xFF;
        let err = read_tensor_infos(&mut data.as_slice()).unwrap_err();
        assert!(err.to_string().contains("invalid GGUF magic"));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut data = synthetic_gguf(&[]);
        data[4..8].copy_from_slice(&1u32.to_le_bytes());
        let err = read_tensor_infos(&mut data.as_slice()).unwrap_err();
        assert!(err.to_string().contains("unsupported GGUF version"));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let data = synthetic_gguf(&[("a.weight", &[2], 0)]);
        let err = read_tensor_infos(&mut &data[..data.len() - 4]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_string_length_sanity_cap() {
        let mut data = Vec::new();
        data.extend_from_slice(&GGUF_MAGIC.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&1u64.to_le_bytes());
        data.extend_from_slice(&u64::MAX.to_le_bytes()); // absurd key length
        let err = read_tensor_infos(&mut data.as_slice()).unwrap_err();
        assert!(err.to_string().contains("sanity cap"));
    }

    #[test]
    fn test_ggml_type_names() {
        assert_eq!(ggml_type_name(0), "F32");
        assert_eq!(ggml_type_name(14), "Q6_K");
        assert_eq!(ggml_type_name(30), "BF16");
        assert_eq!(ggml_type_name(99), "UNKNOWN(99)");
    }

    #[test]
    fn test_list_dir_tsv_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let data = synthetic_gguf(&[
            ("blk.0.attn_q.weight", &[16, 16], 12),
            ("blk.0.attn_q.bias", &[16], 0),
        ]);
        std::fs::write(dir.path().join("model.gguf"), data).unwrap();

        let out = list_dir(dir.path(), 3).unwrap();
        assert!(out.starts_with("File\tTensorKey\tTensorParams\tTensorType\tTensorShape\n"));
        assert!(out.contains("model.gguf\tblk.0.attn_q.weight\t256\tQ4_K\t[16, 16]"));
        assert!(out.contains("model.gguf\tblk.0.attn_q.bias\t16\tF32\t[16]"));
        // bias and weight share the "weight" class; empty prefix totals both
        assert!(out.contains("Summary\tweight[]\t272\t\t"));
        assert!(out.contains("Summary\tweight[blk]\t272\t\t"));
        assert!(out.contains("Summary\tweight[blk.0]\t272\t\t"));
    }

    #[test]
    fn test_list_dir_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = list_dir(dir.path(), 3).unwrap();
        assert_eq!(out.lines().count(), 1); // header only
    }
}
