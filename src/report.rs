//! Benchmark report aggregation and rendering
//!
//! Reads the accumulated `.bench` result files, groups records into
//! per-endpoint series sorted by echoed concurrency, and renders a
//! self-contained ECharts bubble chart. Unlike the probe path, the report
//! path is partial-data tolerant: a malformed line (including a trailing
//! partial line from an in-flight sweep) is skipped with a warning, while a
//! missing required measurement field in a well-formed record fails the
//! whole report.
//!
//! All accumulation is function-local; the aggregation step returns an
//! explicit [`ReportData`] value rather than touching shared state, so it
//! is re-entrant and testable in isolation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::BenchConfig;
use crate::error::{BubbleBenchError, Result};
use crate::probe::{bench_file, FIELD_ENDPOINT_NAME, FIELD_THROUGHPUT_SCALE};

/// Fixed report output file name, overwritten on every run
pub const REPORT_FILE: &str = "bubble_bench_report.html";

/// Measurement fields every record must carry for the report
pub const REQUIRED_FIELDS: &[&str] = &[
    FIELD_ENDPOINT_NAME,
    FIELD_THROUGHPUT_SCALE,
    "max_concurrency",
    "request_throughput",
    "mean_tpot_ms",
    "mean_ttft_ms",
];

// ============================================================================
// Aggregation
// ============================================================================

/// One chart point derived from a single probe record
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    /// Concurrency echoed by the load generator (`max_concurrency`), the
    /// grouping key; expected but not asserted to match the configured level
    pub concurrency: f64,
    /// Mean time-per-output-token in milliseconds
    pub tpot_ms: f64,
    /// Mean time-to-first-token in milliseconds
    pub ttft_ms: f64,
    /// `request_throughput * throughput_scale`
    pub effective_throughput: f64,
}

/// Axis/color scaling bounds over the whole dataset
#[derive(Debug, Clone, PartialEq)]
pub struct ReportBounds {
    /// Maximum echoed concurrency
    pub concur_max: f64,
    /// Minimum mean TTFT
    pub ttft_min: f64,
    /// Maximum mean TTFT
    pub ttft_max: f64,
    /// Minimum effective throughput
    pub throughput_min: f64,
    /// Maximum effective throughput
    pub throughput_max: f64,
}

/// Aggregated, chart-ready dataset
#[derive(Debug, Default)]
pub struct ReportData {
    /// Per-endpoint series, keyed by endpoint name (sorted), each series
    /// sorted by concurrency ascending
    pub series: BTreeMap<String, Vec<SeriesPoint>>,
}

impl ReportData {
    /// Global min/max bounds for chart scaling
    ///
    /// Empty value sets fall back to 0.0; non-finite effective-throughput
    /// values are excluded before min/max.
    #[must_use]
    pub fn bounds(&self) -> ReportBounds {
        let points = self.series.values().flatten();
        let mut concur_max = f64::NEG_INFINITY;
        let mut ttft_min = f64::INFINITY;
        let mut ttft_max = f64::NEG_INFINITY;
        let mut tp_min = f64::INFINITY;
        let mut tp_max = f64::NEG_INFINITY;
        for p in points {
            concur_max = concur_max.max(p.concurrency);
            ttft_min = ttft_min.min(p.ttft_ms);
            ttft_max = ttft_max.max(p.ttft_ms);
            if p.effective_throughput.is_finite() {
                tp_min = tp_min.min(p.effective_throughput);
                tp_max = tp_max.max(p.effective_throughput);
            }
        }
        let safe = |v: f64| if v.is_finite() { v } else { 0.0 };
        ReportBounds {
            concur_max: safe(concur_max),
            ttft_min: safe(ttft_min),
            ttft_max: safe(ttft_max),
            throughput_min: safe(tp_min),
            throughput_max: safe(tp_max),
        }
    }
}

/// Discover the result files to aggregate
///
/// With an explicit config, only that config's endpoints' files (those that
/// exist) are read; otherwise every `*.bench` file in `dir` is read.
///
/// # Errors
///
/// Returns `IoError` if the directory cannot be listed.
pub fn collect_result_files(dir: &Path, config: Option<&BenchConfig>) -> Result<Vec<PathBuf>> {
    if let Some(config) = config {
        return Ok(config
            .endpoint_names()
            .iter()
            .map(|name| bench_file(dir, name))
            .filter(|path| path.is_file())
            .collect());
    }
    let entries = fs::read_dir(dir).map_err(|e| BubbleBenchError::IoError {
        message: format!("failed to list {}: {e}", dir.display()),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "bench") && path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Parse and group all records from the given result files
///
/// # Errors
///
/// Returns `IoError` if a file cannot be read and `ReportError` when a
/// well-formed record is missing a required field. Malformed lines are
/// skipped with a warning on stderr.
pub fn aggregate_files(files: &[PathBuf]) -> Result<ReportData> {
    let mut data = ReportData::default();
    for file in files {
        let contents = fs::read_to_string(file).map_err(|e| BubbleBenchError::IoError {
            message: format!("failed to read {}: {e}", file.display()),
        })?;
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!(
                        "warning: skipping malformed line {} in {}: {e}",
                        lineno + 1,
                        file.display()
                    );
                    continue;
                },
            };
            let (name, point) = extract_point(&record, file)?;
            data.series.entry(name).or_default().push(point);
        }
    }
    for points in data.series.values_mut() {
        points.sort_by(|a, b| {
            a.concurrency
                .partial_cmp(&b.concurrency)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    Ok(data)
}

/// Pull the required fields out of one record
fn extract_point(record: &Value, file: &Path) -> Result<(String, SeriesPoint)> {
    let field = |key: &str| -> Result<&Value> {
        record.get(key).ok_or_else(|| BubbleBenchError::ReportError {
            reason: format!("record in {} is missing field '{key}'", file.display()),
        })
    };
    let numeric = |key: &str| -> Result<f64> {
        field(key)?
            .as_f64()
            .ok_or_else(|| BubbleBenchError::ReportError {
                reason: format!("field '{key}' in {} is not numeric", file.display()),
            })
    };

    let name = field(FIELD_ENDPOINT_NAME)?
        .as_str()
        .ok_or_else(|| BubbleBenchError::ReportError {
            reason: format!(
                "field '{FIELD_ENDPOINT_NAME}' in {} is not a string",
                file.display()
            ),
        })?
        .to_string();
    let scale = numeric(FIELD_THROUGHPUT_SCALE)?;
    let point = SeriesPoint {
        concurrency: numeric("max_concurrency")?,
        tpot_ms: numeric("mean_tpot_ms")?,
        ttft_ms: numeric("mean_ttft_ms")?,
        effective_throughput: numeric("request_throughput")? * scale,
    };
    Ok((name, point))
}

// ============================================================================
// Rendering
// ============================================================================

/// Render the aggregated dataset as a self-contained ECharts document
///
/// The only external dependency is the ECharts library itself, loaded from
/// a CDN; all series data and bounds are embedded inline.
#[must_use]
pub fn render_html(data: &ReportData) -> String {
    let bounds = data.bounds();
    let legend =
        serde_json::to_string(&data.series.keys().collect::<Vec<_>>()).unwrap_or_default();
    let series_js = data
        .series
        .iter()
        .map(|(name, points)| {
            let rows: Vec<[f64; 4]> = points
                .iter()
                .map(|p| {
                    [
                        p.concurrency,
                        p.tpot_ms,
                        p.ttft_ms,
                        p.effective_throughput,
                    ]
                })
                .collect();
            format!(
                "{{name: {}, type: 'scatter', itemStyle: itemStyle, data: {}}}",
                serde_json::to_string(name).unwrap_or_default(),
                serde_json::to_string(&rows).unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join(",\n                ");

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Performance Bubble Chart</title>
    <script src="https://cdn.jsdelivr.net/npm/echarts@5.5.0/dist/echarts.min.js"></script>
</head>
<body>
    <div id="chart" style="width: 100%; height: 600px;"></div>
    <script type="text/javascript">
        var chartDom = document.getElementById('chart');
        var myChart = echarts.init(chartDom);

        const schema = [
            {{name: 'concurrency', index: 0, text: 'Request concurrency'}},
            {{name: 'tpot', index: 1, text: 'Mean TPOT (ms)'}},
            {{name: 'ttft', index: 2, text: 'Mean TTFT (ms)'}},
            {{name: 'throughput', index: 3, text: 'Effective throughput (req/s)'}}
        ];
        const itemStyle = {{
            opacity: 0.8,
            shadowBlur: 10,
            shadowOffsetX: 0,
            shadowOffsetY: 0,
            shadowColor: 'rgba(0,0,0,0.3)'
        }};

        const option = {{
            legend: {{
                top: 10,
                data: {legend},
                textStyle: {{ fontSize: 16 }}
            }},
            grid: {{
                left: '10%',
                right: 150,
                top: '18%',
                bottom: '10%'
            }},
            tooltip: {{
                backgroundColor: 'rgba(255,255,255,0.7)',
                formatter: function (param) {{
                    var value = param.value;
                    return '<div style="border-bottom: 1px solid rgba(255,255,255,.3); font-size: 18px;padding-bottom: 7px;margin-bottom: 7px">'
                        + param.seriesName + ' concurrency ' + value[0] + '</div>'
                        + schema[1].text + ': ' + value[1].toFixed(2) + '<br>'
                        + schema[2].text + ': ' + value[2].toFixed(2) + '<br>'
                        + schema[3].text + ': ' + value[3].toFixed(2) + '<br>';
                }}
            }},
            xAxis: {{
                type: 'value',
                name: 'Concurrency',
                nameGap: 16,
                nameTextStyle: {{ fontSize: 16 }},
                max: {concur_max},
                splitLine: {{ show: false }}
            }},
            yAxis: {{
                type: 'value',
                name: 'Mean TPOT (ms)',
                nameLocation: 'end',
                nameGap: 20,
                nameTextStyle: {{ fontSize: 16 }},
                splitLine: {{ show: false }}
            }},
            visualMap: [
                {{
                    left: 'right',
                    top: '10%',
                    dimension: 3,
                    min: {tp_min},
                    max: {tp_max},
                    itemWidth: 30,
                    itemHeight: 120,
                    calculable: true,
                    precision: 0.1,
                    text: ['Bubble size: effective throughput (req/s)'],
                    textGap: 30,
                    inRange: {{ symbolSize: [10, 70] }},
                    outOfRange: {{ symbolSize: [10, 70], color: ['rgba(255,255,255,0.4)'] }},
                    controller: {{ inRange: {{ color: ['#c23531'] }}, outOfRange: {{ color: ['#999'] }} }}
                }},
                {{
                    left: 'right',
                    bottom: '5%',
                    dimension: 2,
                    min: {ttft_min},
                    max: {ttft_max},
                    itemHeight: 120,
                    text: ['Color depth: Mean TTFT (ms)'],
                    textGap: 30,
                    inRange: {{ colorLightness: [0.9, 0.5] }},
                    outOfRange: {{ color: ['rgba(255,255,255,0.4)'] }},
                    controller: {{ inRange: {{ color: ['#c23531'] }}, outOfRange: {{ color: ['#999'] }} }}
                }}
            ],
            series: [
                {series_js}
            ]
        }};
        myChart.setOption(option);
    </script>
</body>
</html>
"#,
        legend = legend,
        concur_max = bounds.concur_max,
        tp_min = bounds.throughput_min,
        tp_max = bounds.throughput_max,
        ttft_min = bounds.ttft_min,
        ttft_max = bounds.ttft_max,
        series_js = series_js,
    )
}

/// Aggregate result files and write the chart document
///
/// Safe to run while a sweep is still appending elsewhere: a trailing
/// incomplete line is skipped like any other malformed line.
///
/// # Errors
///
/// Returns `IoError` for unreadable inputs or an unwritable output, and
/// `ReportError` for dataset-level field violations.
pub fn generate_report(dir: &Path, config: Option<&BenchConfig>) -> Result<PathBuf> {
    let files = collect_result_files(dir, config)?;
    let data = aggregate_files(&files)?;
    let html = render_html(&data);
    let out = dir.join(REPORT_FILE);
    fs::write(&out, html).map_err(|e| BubbleBenchError::IoError {
        message: format!("failed to write {}: {e}", out.display()),
    })?;
    println!("Benchmark report generated: {}", out.display());
    Ok(out)
}
