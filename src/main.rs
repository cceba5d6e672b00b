//! Bubblebench CLI - batch benchmarking for LLM serving endpoints
//!
//! # Commands
//!
//! - `bench` - Run concurrency sweeps against configured endpoints
//! - `show-gguf` - List tensors in GGUF model files
//! - `show-safetensors` - List tensors in safetensors model files

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use bubblebench::config::{BenchConfig, DEFAULT_CONFIG_JSON};
use bubblebench::error::Result;
use bubblebench::{dispatch, inspect, report};

/// Config path used when `--config` is not supplied
const DEFAULT_CONFIG_PATH: &str = "bench_config.json";

/// Bubblebench - batch benchmarking harness for LLM serving endpoints
///
/// Drives an external load generator across a concurrency grid for every
/// configured endpoint and renders the results as a bubble-chart report.
#[derive(Parser)]
#[command(name = "bubblebench")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run benchmark sweeps and generate the report
    ///
    /// Examples:
    ///   bubblebench bench --print-config > bench_config.json
    ///   bubblebench bench -c bench_config.json
    ///   bubblebench bench -c bench_config.json -j 3
    ///   bubblebench bench --gen-report
    Bench {
        /// Path to the benchmark config (JSON, line comments allowed);
        /// defaults to bench_config.json when sweeping. With --gen-report,
        /// omitting it aggregates every .bench file in the directory.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the built-in sample config to stdout and exit
        #[arg(long)]
        print_config: bool,

        /// Skip the sweeps and regenerate the report from existing results
        #[arg(long)]
        gen_report: bool,

        /// Number of endpoints to benchmark in parallel
        #[arg(short = 'j', long, default_value = "1")]
        jobs: usize,

        /// Echo each constructed load-generator command line before running it
        #[arg(short, long)]
        verbose: bool,
    },
    /// List tensors in GGUF model files as TSV
    ///
    /// Examples:
    ///   bubblebench show-gguf /models/llama3-8b
    ///   bubblebench show-gguf -d 2 .
    ShowGguf {
        /// Directory containing `.gguf` files
        #[arg(value_name = "MODEL_DIR", default_value = ".")]
        model_dir: PathBuf,

        /// Name-prefix depth for the parameter-count summary (0 = full depth)
        #[arg(short = 'd', long, default_value = "3")]
        summary_depth: usize,
    },
    /// List tensors in safetensors model files as TSV
    ///
    /// Examples:
    ///   bubblebench show-safetensors /models/qwen2-7b
    ShowSafetensors {
        /// Directory containing `.safetensors` files
        #[arg(value_name = "MODEL_DIR", default_value = ".")]
        model_dir: PathBuf,
    },
}

/// Run the `bench` subcommand in `work_dir`
fn run_bench(
    work_dir: &Path,
    config: Option<PathBuf>,
    gen_report: bool,
    jobs: usize,
    verbose: bool,
) -> Result<()> {
    if gen_report {
        // Report-only mode: an explicit config scopes the report to its
        // endpoints; without one, every .bench file in the directory is
        // aggregated (the way results from several configs get unified).
        let scope = match config {
            Some(path) => Some(BenchConfig::from_file(path)?),
            None => None,
        };
        report::generate_report(work_dir, scope.as_ref())?;
        return Ok(());
    }

    let config_path = config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let bench_config = BenchConfig::from_file(&config_path)?;
    let outcome = dispatch::run_benchmark(work_dir, &bench_config, jobs, verbose);
    // Completed sweeps are reported even when a sibling failed; a sweep
    // failure outranks a report failure in the exit diagnostic.
    match report::generate_report(work_dir, Some(&bench_config)) {
        Ok(_) => outcome,
        Err(report_err) => {
            if let Err(sweep_err) = outcome {
                eprintln!("Error: {report_err}");
                Err(sweep_err)
            } else {
                Err(report_err)
            }
        },
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Bench {
            config,
            print_config,
            gen_report,
            jobs,
            verbose,
        } => {
            if print_config {
                println!("{DEFAULT_CONFIG_JSON}");
                return Ok(());
            }
            // Result and report files live in the invocation directory.
            run_bench(Path::new("."), config, gen_report, jobs, verbose)
        },
        Commands::ShowGguf {
            model_dir,
            summary_depth,
        } => {
            print!("{}", inspect::gguf::list_dir(&model_dir, summary_depth)?);
            Ok(())
        },
        Commands::ShowSafetensors { model_dir } => {
            print!("{}", inspect::safetensors::list_dir(&model_dir)?);
            Ok(())
        },
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cli_parses_gen_report_without_config() {
        let cli = Cli::try_parse_from(["bubblebench", "bench", "--gen-report"]).unwrap();
        match cli.command {
            Commands::Bench {
                config, gen_report, ..
            } => {
                assert!(config.is_none());
                assert!(gen_report);
            },
            _ => panic!("expected bench subcommand"),
        }
    }

    #[test]
    fn test_gen_report_without_config_globs_all_results() {
        let dir = tempfile::tempdir().unwrap();
        // Results from two separate runs; no config file on disk.
        for name in ["A", "B"] {
            fs::write(
                dir.path().join(format!("{name}.bench")),
                format!(
                    r#"{{"max_concurrency": 1, "request_throughput": 1.0, "mean_tpot_ms": 1.0, "mean_ttft_ms": 1.0, "_throughput_scale": 1.0, "_endpoint_name": "{name}"}}"#
                ) + "\n",
            )
            .unwrap();
        }

        run_bench(dir.path(), None, true, 1, false).unwrap();

        let html = fs::read_to_string(dir.path().join(report::REPORT_FILE)).unwrap();
        assert!(html.contains("\"A\""));
        assert!(html.contains("\"B\""));
    }

    #[test]
    fn test_gen_report_with_config_scopes_to_its_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["A", "B"] {
            fs::write(
                dir.path().join(format!("{name}.bench")),
                format!(
                    r#"{{"max_concurrency": 1, "request_throughput": 1.0, "mean_tpot_ms": 1.0, "mean_ttft_ms": 1.0, "_throughput_scale": 1.0, "_endpoint_name": "{name}"}}"#
                ) + "\n",
            )
            .unwrap();
        }
        let config_path = dir.path().join("only_a.json");
        fs::write(
            &config_path,
            r#"{
                "sglang_bench_cmd": ["gen"],
                "concurs": [1],
                "endpoints": [{"base_url": "http://a:1", "name": "A"}]
            }"#,
        )
        .unwrap();

        run_bench(dir.path(), Some(config_path), true, 1, false).unwrap();

        let html = fs::read_to_string(dir.path().join(report::REPORT_FILE)).unwrap();
        assert!(html.contains("\"A\""));
        assert!(!html.contains("\"B\""));
    }

    #[test]
    fn test_sweep_failure_outranks_report_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("bench_config.json");
        fs::write(
            &config_path,
            r#"{
                "sglang_bench_cmd": ["false #"],
                "concurs": [1],
                "repeats": 1,
                "endpoints": [{"base_url": "http://a:1", "name": "A"}]
            }"#,
        )
        .unwrap();
        // A directory squatting on the report path makes the report write fail.
        fs::create_dir(dir.path().join(report::REPORT_FILE)).unwrap();

        let err = run_bench(dir.path(), Some(config_path), false, 1, false).unwrap_err();
        assert!(err.to_string().contains("Probe failed"), "got: {err}");
    }
}
