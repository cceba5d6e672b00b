//! Benchmark configuration model
//!
//! The configuration document is JSON with one non-standard allowance:
//! full-line `//` comments, stripped before parsing so the built-in
//! template can ship annotated.
//!
//! ## Destructive precondition
//!
//! Starting a sweep truncates each configured endpoint's `.bench` result
//! file. When several configs are benchmarked in the same directory their
//! endpoint names must be disjoint, otherwise a later run silently discards
//! an earlier run's records.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BubbleBenchError, Result};

/// Built-in configuration template, printable via `bench --print-config`
pub const DEFAULT_CONFIG_JSON: &str = r#"{
    "sglang_bench_cmd": [
        "OPENAI_API_KEY=null python3 -m sglang.bench_serving --backend sglang-oai --disable-tqdm",
        "--dataset-path /workspace/ShareGPT_Vicuna_unfiltered/ShareGPT_V3_unfiltered_cleaned_split.json",
        "--dataset-name random --random-range-ratio 1",
        "--random-input-len 2300 --random-output-len 700"
    ],
    // concurs: max-concurrency levels, one benchmark probe per level
    // repeats: sample multiplier per level (samples = concurrency * repeat);
    // either a single integer for all levels or a list matching concurs
    "concurs": [ 1, 2, 4, 8,10,12,16,20,24,28,32,40,48,56,64,80,96,112,128],
    "repeats": [10,10,10,10,10, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 5, 5,  5,  5],
    "endpoints": [
        {
            "base_url": "http://localhost:8080",
            // throughput scale: normalizes multi-device throughput to
            // per-device (e.g. 0.25 for a TP4 deployment); defaults to 1.0
            "throughput_scale": 0.25,
            // legend name; defaults to the simplified base_url
            "name": "TP4"
        },
        {
            "base_url": "http://localhost:8084",
            "throughput_scale": 0.5,
            "name": "TP2"
        },
        {
            "base_url": "http://localhost:8086",
            "throughput_scale": 1.0,
            "name": "TP1"
        }
    ]
}"#;

/// Default repeat count when the config omits `repeats`
const DEFAULT_REPEAT: u32 = 10;

// ============================================================================
// Endpoint
// ============================================================================

/// One target inference server under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Server base URL; unique key within one config
    pub base_url: String,
    /// Optional legend alias; unique within one config when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Per-endpoint throughput normalization factor (default 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput_scale: Option<f64>,
}

impl Endpoint {
    /// Create an endpoint with default scale and no alias
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            name: None,
            throughput_scale: None,
        }
    }

    /// Set the legend alias
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Set the throughput scale
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.throughput_scale = Some(scale);
        self
    }

    /// Effective throughput scale (1.0 when unset)
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.throughput_scale.unwrap_or(1.0)
    }

    /// Filesystem- and legend-safe identifier for this endpoint
    ///
    /// Prefers the explicit `name` over the `base_url`, strips a leading
    /// `http://` or `https://` scheme, and replaces each `:` and `-` with
    /// `.`. Deterministic and idempotent; uniqueness across a config is
    /// enforced by [`BenchConfig::validate`], not here.
    #[must_use]
    pub fn normalized_name(&self) -> String {
        let raw = self.name.as_deref().unwrap_or(&self.base_url);
        let stripped = raw
            .strip_prefix("https://")
            .or_else(|| raw.strip_prefix("http://"))
            .unwrap_or(raw);
        stripped.replace([':', '-'], ".")
    }
}

// ============================================================================
// Repeats
// ============================================================================

/// Repeat counts for the concurrency sweep
///
/// The config accepts either a single integer applied to every level or a
/// list matching `concurs` element for element. Kept as an explicit
/// discriminated value so per-index resolution is a total function rather
/// than a runtime type check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Repeats {
    /// One repeat count for every concurrency level
    Uniform(u32),
    /// One repeat count per concurrency level, same length as `concurs`
    PerLevel(Vec<u32>),
}

impl Default for Repeats {
    fn default() -> Self {
        Self::Uniform(DEFAULT_REPEAT)
    }
}

impl Repeats {
    /// Repeat count for the concurrency level at `index`
    ///
    /// For `PerLevel` the index must be in range; [`BenchConfig::validate`]
    /// guarantees the list length matches `concurs`.
    #[must_use]
    pub fn resolve(&self, index: usize) -> u32 {
        match self {
            Self::Uniform(n) => *n,
            Self::PerLevel(v) => v[index],
        }
    }
}

// ============================================================================
// BenchConfig
// ============================================================================

/// User-supplied benchmark configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Load-generator invocation template, joined with the probe parameters
    /// into one shell command line
    pub sglang_bench_cmd: Vec<String>,
    /// Max-concurrency levels, probed in this order
    pub concurs: Vec<u32>,
    /// Sample multiplier per level
    #[serde(default)]
    pub repeats: Repeats,
    /// Target servers, unique by base URL and (when present) by name
    pub endpoints: Vec<Endpoint>,
}

impl BenchConfig {
    /// Parse a config document, stripping full-line `//` comments first
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for malformed JSON.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let json = strip_line_comments(raw);
        serde_json::from_str(&json)
            .map_err(|e| BubbleBenchError::InvalidConfiguration(format!("malformed JSON: {e}")))
    }

    /// Load and parse a config file
    ///
    /// # Errors
    ///
    /// Returns `IoError` if the file cannot be read and
    /// `InvalidConfiguration` for malformed JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|e| BubbleBenchError::IoError {
            message: format!("failed to read config {}: {e}", path.as_ref().display()),
        })?;
        Self::from_json_str(&raw)
    }

    /// Validate structural invariants before any probing starts
    ///
    /// Checks, each a hard failure:
    /// - a `PerLevel` repeats list must match `concurs` in length
    /// - no two endpoints may share a `base_url`
    /// - no two endpoints may share a non-null `name`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming the violated invariant.
    pub fn validate(&self) -> Result<()> {
        if let Repeats::PerLevel(ref v) = self.repeats {
            if v.len() != self.concurs.len() {
                return Err(BubbleBenchError::InvalidConfiguration(format!(
                    "repeats/concurs length mismatch: {} repeats for {} concurrency levels",
                    v.len(),
                    self.concurs.len()
                )));
            }
        }

        let mut base_urls = std::collections::HashSet::new();
        let mut names = std::collections::HashSet::new();
        for ep in &self.endpoints {
            if !base_urls.insert(ep.base_url.as_str()) {
                return Err(BubbleBenchError::InvalidConfiguration(format!(
                    "duplicate endpoint base_url: {}",
                    ep.base_url
                )));
            }
            if let Some(ref name) = ep.name {
                if !names.insert(name.as_str()) {
                    return Err(BubbleBenchError::InvalidConfiguration(format!(
                        "duplicate endpoint name: {name}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Normalized names of all configured endpoints, in config order
    #[must_use]
    pub fn endpoint_names(&self) -> Vec<String> {
        self.endpoints
            .iter()
            .map(Endpoint::normalized_name)
            .collect()
    }
}

/// Strip full-line `//` comments from a JSON document
///
/// Only lines whose first non-whitespace characters are `//` are removed;
/// `//` inside string values is untouched.
#[must_use]
pub fn strip_line_comments(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}
