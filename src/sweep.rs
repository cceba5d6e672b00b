//! Per-endpoint concurrency sweep
//!
//! A sweep probes one endpoint at every configured concurrency level,
//! strictly sequentially: overlapping probes against the same endpoint
//! would contend with each other and invalidate the load measurement.

use std::fs;
use std::path::Path;

use crate::config::{Endpoint, Repeats};
use crate::error::Result;
use crate::probe::{bench_file, run_probe};

/// Run the full concurrency sweep for one endpoint
///
/// Fresh-run semantics: any pre-existing `.bench` file for this endpoint is
/// removed first, so the post-sweep file holds exactly this run's records.
/// This is intentionally destructive; configs benchmarked in the same
/// directory must use disjoint endpoint names.
///
/// Progress is printed per level as `[i/total]` with the endpoint label.
///
/// # Errors
///
/// Returns the first probe failure; remaining levels are not attempted.
/// Records from earlier, successful levels remain on disk.
pub fn run_sweep(
    dir: &Path,
    bench_cmd: &[String],
    endpoint: &Endpoint,
    concurs: &[u32],
    repeats: &Repeats,
    verbose: bool,
) -> Result<()> {
    let endpoint_name = endpoint.normalized_name();
    let _ = fs::remove_file(bench_file(dir, &endpoint_name));

    let total = concurs.len();
    for (i, &concurrency) in concurs.iter().enumerate() {
        println!(
            "[{}/{total}] Benching {endpoint_name}: concurrency {concurrency}",
            i + 1
        );
        let repeat = repeats.resolve(i);
        run_probe(dir, bench_cmd, endpoint, concurrency, repeat, verbose)?;
    }
    Ok(())
}
