//! Single-point load-generator probe
//!
//! One probe runs the external load generator at a fixed
//! (endpoint, concurrency, repeat) triple and appends the tagged result to
//! the endpoint's append-only `.bench` file. Any failure on this path is
//! fatal to the endpoint's sweep: non-zero generator exit, missing or
//! malformed output, or an I/O error. No retry.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

use crate::config::Endpoint;
use crate::error::{BubbleBenchError, Result};

/// Extra field injected into every record: owning endpoint's scale
pub const FIELD_THROUGHPUT_SCALE: &str = "_throughput_scale";
/// Extra field injected into every record: owning endpoint's normalized name
pub const FIELD_ENDPOINT_NAME: &str = "_endpoint_name";

/// Durable per-endpoint result file (`<name>.bench`)
#[must_use]
pub fn bench_file(dir: &Path, endpoint_name: &str) -> PathBuf {
    dir.join(format!("{endpoint_name}.bench"))
}

/// Per-endpoint log file capturing raw generator stdout and stderr
/// (`<name>.log`)
#[must_use]
pub fn log_file(dir: &Path, endpoint_name: &str) -> PathBuf {
    dir.join(format!("{endpoint_name}.log"))
}

/// Private temporary output file for one probe
///
/// Scoped to (endpoint, concurrency) so probes at different levels never
/// collide on a file name.
#[must_use]
pub fn tmp_file(dir: &Path, endpoint_name: &str, concurrency: u32) -> PathBuf {
    dir.join(format!("{endpoint_name}-{concurrency}.bench"))
}

/// Build the full shell command line for one probe
///
/// Joins the template fragments with the endpoint URL and the numeric
/// parameters. Request rate and max concurrency are both set to the probe's
/// concurrency level; the sample count is `concurrency * repeat`.
#[must_use]
pub fn build_command(
    bench_cmd: &[String],
    base_url: &str,
    concurrency: u32,
    num_samples: u32,
    output_file: &Path,
) -> String {
    let mut parts: Vec<String> = bench_cmd.to_vec();
    parts.push(format!("--base-url {base_url}"));
    parts.push(format!("--request-rate {concurrency}"));
    parts.push(format!("--max-concurrency {concurrency}"));
    parts.push(format!("--num-prompt {num_samples}"));
    parts.push(format!("--output-file {}", output_file.display()));
    parts.join(" ")
}

/// Run one probe and append its tagged record to the endpoint's `.bench` file
///
/// # Errors
///
/// Returns `ProbeError` when the generator exits non-zero or its output file
/// is missing or not a single JSON object, and `IoError` when the result or
/// log file cannot be written.
pub fn run_probe(
    dir: &Path,
    bench_cmd: &[String],
    endpoint: &Endpoint,
    concurrency: u32,
    repeat: u32,
    verbose: bool,
) -> Result<()> {
    let endpoint_name = endpoint.normalized_name();
    let num_samples = concurrency * repeat;
    let tmp = tmp_file(dir, &endpoint_name, concurrency);

    // Stale output from an interrupted run would be read as this probe's
    // result; clear it first.
    let _ = fs::remove_file(&tmp);

    let cmd = build_command(bench_cmd, &endpoint.base_url, concurrency, num_samples, &tmp);
    if verbose {
        println!("{cmd}");
    }

    let result = execute_and_record(dir, &endpoint_name, &cmd, &tmp, endpoint);
    let _ = fs::remove_file(&tmp);
    result
}

/// Execute the generator command and append the tagged record
fn execute_and_record(
    dir: &Path,
    endpoint_name: &str,
    cmd: &str,
    tmp: &Path,
    endpoint: &Endpoint,
) -> Result<()> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(dir)
        .output()
        .map_err(|e| BubbleBenchError::ProbeError {
            endpoint: endpoint_name.to_string(),
            reason: format!("failed to launch load generator: {e}"),
        })?;

    // Both streams land in the log; a successful generator may still print
    // progress or warnings on stderr.
    append_bytes(&log_file(dir, endpoint_name), &output.stdout)?;
    append_bytes(&log_file(dir, endpoint_name), &output.stderr)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BubbleBenchError::ProbeError {
            endpoint: endpoint_name.to_string(),
            reason: format!(
                "load generator exited with {}: {}",
                output.status,
                stderr.trim()
            ),
        });
    }

    let raw = fs::read_to_string(tmp).map_err(|e| BubbleBenchError::ProbeError {
        endpoint: endpoint_name.to_string(),
        reason: format!("missing generator output {}: {e}", tmp.display()),
    })?;
    let mut record: serde_json::Map<String, Value> =
        serde_json::from_str(&raw).map_err(|e| BubbleBenchError::ProbeError {
            endpoint: endpoint_name.to_string(),
            reason: format!("malformed generator output {}: {e}", tmp.display()),
        })?;

    record.insert(
        FIELD_THROUGHPUT_SCALE.to_string(),
        Value::from(endpoint.scale()),
    );
    record.insert(
        FIELD_ENDPOINT_NAME.to_string(),
        Value::from(endpoint_name.to_string()),
    );

    let line = serde_json::to_string(&record).map_err(|e| BubbleBenchError::ProbeError {
        endpoint: endpoint_name.to_string(),
        reason: format!("failed to serialize record: {e}"),
    })?;
    append_bytes(
        &bench_file(dir, endpoint_name),
        format!("{line}\n").as_bytes(),
    )
}

/// Open-append-write-close; the file is never held open across probes
fn append_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BubbleBenchError::IoError {
            message: format!("failed to open {}: {e}", path.display()),
        })?;
    f.write_all(bytes).map_err(|e| BubbleBenchError::IoError {
        message: format!("failed to append to {}: {e}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_paths_use_endpoint_name() {
        let dir = Path::new("/work");
        assert_eq!(bench_file(dir, "TP4"), Path::new("/work/TP4.bench"));
        assert_eq!(log_file(dir, "TP4"), Path::new("/work/TP4.log"));
        assert_eq!(tmp_file(dir, "TP4", 32), Path::new("/work/TP4-32.bench"));
    }

    #[test]
    fn test_tmp_files_distinct_per_concurrency() {
        let dir = Path::new(".");
        assert_ne!(tmp_file(dir, "A", 1), tmp_file(dir, "A", 2));
    }

    #[test]
    fn test_build_command_substitutes_parameters() {
        let template = vec!["run-bench --disable-tqdm".to_string()];
        let cmd = build_command(&template, "http://a:1", 8, 80, Path::new("A-8.bench"));
        assert!(cmd.starts_with("run-bench --disable-tqdm"));
        assert!(cmd.contains("--base-url http://a:1"));
        assert!(cmd.contains("--request-rate 8"));
        assert!(cmd.contains("--max-concurrency 8"));
        assert!(cmd.contains("--num-prompt 80"));
        assert!(cmd.contains("--output-file A-8.bench"));
    }

    #[test]
    fn test_build_command_preserves_template_order() {
        let template = vec!["first".to_string(), "second".to_string()];
        let cmd = build_command(&template, "http://a:1", 1, 1, Path::new("t"));
        let first = cmd.find("first").unwrap();
        let second = cmd.find("second").unwrap();
        let base = cmd.find("--base-url").unwrap();
        assert!(first < second && second < base);
    }

    #[test]
    fn test_run_probe_failing_command_is_probe_error() {
        let dir = tempfile::tempdir().unwrap();
        let ep = crate::config::Endpoint::new("http://a:1").with_name("A");
        let err = run_probe(
            dir.path(),
            &["false #".to_string()],
            &ep,
            1,
            1,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Probe failed for endpoint 'A'"));
    }

    #[test]
    fn test_run_probe_logs_stderr_of_successful_generator() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("noisy_gen.sh");
        std::fs::write(
            &script,
            r#"out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-file) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "progress on stdout"
echo "warning on stderr" >&2
printf '{"request_throughput": 1.0}' > "$out""#,
        )
        .unwrap();
        let ep = crate::config::Endpoint::new("http://a:1").with_name("A");
        run_probe(
            dir.path(),
            &[format!("sh {}", script.display())],
            &ep,
            1,
            1,
            false,
        )
        .unwrap();

        let log = fs::read_to_string(log_file(dir.path(), "A")).unwrap();
        assert!(log.contains("progress on stdout"));
        assert!(log.contains("warning on stderr"));
    }

    #[test]
    fn test_run_probe_missing_output_is_probe_error() {
        let dir = tempfile::tempdir().unwrap();
        let ep = crate::config::Endpoint::new("http://a:1").with_name("A");
        // Command succeeds but never writes the output file.
        let err = run_probe(dir.path(), &["true #".to_string()], &ep, 1, 1, false).unwrap_err();
        assert!(err.to_string().contains("missing generator output"));
    }
}
