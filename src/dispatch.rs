//! Multi-endpoint sweep dispatch
//!
//! One sweep job per endpoint, drained from a shared queue by a fixed-size
//! pool of worker threads. Parallelism is across endpoints only; each
//! endpoint owns its `.bench`/`.log`/temporary files exclusively for the
//! sweep's duration, so workers share nothing but the filesystem and no
//! locking is needed. A failed sweep does not cancel its siblings.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use crate::config::BenchConfig;
use crate::error::{BubbleBenchError, Result};
use crate::sweep::run_sweep;

/// Validate the config and run every endpoint's sweep
///
/// At most `parallel_jobs` sweeps run concurrently (default callers pass 1
/// for fully sequential operation). Returns after all sweeps complete.
///
/// # Errors
///
/// Returns `InvalidConfiguration` before any probing if validation fails,
/// and `ProbeError` after all workers finish if any endpoint's sweep
/// failed. Sweeps for other endpoints run to completion either way.
pub fn run_benchmark(
    dir: &Path,
    config: &BenchConfig,
    parallel_jobs: usize,
    verbose: bool,
) -> Result<()> {
    config.validate()?;

    println!(
        "Benchmarking endpoints: {}",
        config.endpoint_names().join(", ")
    );

    let queue: Mutex<VecDeque<usize>> = Mutex::new((0..config.endpoints.len()).collect());
    let failures: Mutex<Vec<(String, BubbleBenchError)>> = Mutex::new(Vec::new());
    let workers = parallel_jobs.max(1).min(config.endpoints.len().max(1));

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let job = queue.lock().expect("job queue poisoned").pop_front();
                let Some(index) = job else { break };
                let endpoint = &config.endpoints[index];
                if let Err(e) = run_sweep(
                    dir,
                    &config.sglang_bench_cmd,
                    endpoint,
                    &config.concurs,
                    &config.repeats,
                    verbose,
                ) {
                    failures
                        .lock()
                        .expect("failure list poisoned")
                        .push((endpoint.normalized_name(), e));
                }
            });
        }
    });

    let failures = failures.into_inner().expect("failure list poisoned");
    if failures.is_empty() {
        return Ok(());
    }
    let summary = failures
        .iter()
        .map(|(name, e)| format!("{name}: {e}"))
        .collect::<Vec<_>>()
        .join("; ");
    Err(BubbleBenchError::ProbeError {
        endpoint: failures
            .iter()
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>()
            .join(", "),
        reason: format!("{} sweep(s) failed: {summary}", failures.len()),
    })
}
