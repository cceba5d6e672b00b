//! Error types for bubblebench
//!
//! Single crate-wide error enum with descriptive context at the point of
//! detection. Configuration and probe errors abort the process; report-time
//! per-line data errors are handled locally (see `report`).

use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum BubbleBenchError {
    /// Configuration is structurally invalid (duplicate endpoints,
    /// repeats/concurs length mismatch, malformed JSON)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Filesystem operation failed
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the failed operation
        message: String,
    },

    /// A load-generator probe failed (non-zero exit, missing or malformed
    /// output file)
    #[error("Probe failed for endpoint '{endpoint}': {reason}")]
    ProbeError {
        /// Normalized name of the endpoint being probed
        endpoint: String,
        /// Description of the failure
        reason: String,
    },

    /// Binary container format violation (GGUF/safetensors inspection)
    #[error("Format error: {reason}")]
    FormatError {
        /// Description of the format violation
        reason: String,
    },

    /// Report generation failed at the dataset level
    #[error("Report error: {reason}")]
    ReportError {
        /// Description of the failure
        reason: String,
    },
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, BubbleBenchError>;
