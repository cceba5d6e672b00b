//! # Bubblebench
//!
//! Batch benchmarking harness for LLM serving endpoints.
//!
//! Bubblebench drives an external load-generator command (for example
//! `sglang.bench_serving`) across a grid of concurrency levels and a set of
//! serving endpoints, collects per-probe metric records into append-only
//! `.bench` JSONL files, and renders the combined results as an interactive
//! bubble-chart HTML report.
//!
//! ## Workflow
//!
//! 1. Describe the endpoints, concurrency grid, and repeat counts in a JSON
//!    config (line comments allowed).
//! 2. Run the benchmark: every endpoint gets a sweep over the full grid,
//!    optionally in parallel across endpoints.
//! 3. Generate the report: all `.bench` files are aggregated into
//!    `bubble_bench_report.html`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bubblebench::config::BenchConfig;
//! use std::path::Path;
//!
//! let config = BenchConfig::from_file(Path::new("bench_config.json")).unwrap();
//! bubblebench::dispatch::run_benchmark(Path::new("."), &config, 1, false).unwrap();
//! bubblebench::report::generate_report(Path::new("."), Some(&config)).unwrap();
//! ```
//!
//! The crate also ships metadata-only inspectors for GGUF and safetensors
//! model containers under [`inspect`].

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // u32/u64 counts to f64 chart axes
#![allow(clippy::cast_possible_truncation)] // header lengths fit usize on supported targets
#![allow(clippy::must_use_candidate)] // Not all methods need #[must_use]
#![allow(clippy::doc_markdown)] // Allow technical terms without backticks
#![allow(clippy::uninlined_format_args)] // Prefer explicit format args
#![allow(clippy::missing_panics_doc)] // Allow missing Panics doc sections
#![allow(clippy::too_many_lines)] // The HTML template renderer is naturally long

/// Benchmark configuration: endpoints, concurrency grid, repeat counts
pub mod config;
/// Multi-endpoint sweep dispatch with a bounded worker pool
pub mod dispatch;
/// Error types for all bubblebench operations
pub mod error;
/// Metadata-only model container inspection (GGUF, safetensors)
pub mod inspect;
/// Single load-generator probe execution and record collection
pub mod probe;
/// Bubble-chart HTML report generation from `.bench` result files
pub mod report;
/// Full concurrency-grid sweep for one endpoint
pub mod sweep;

pub use error::{BubbleBenchError, Result};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
