use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Error, Result};
use crate::metrics::percentile;

/* ============================= RESULT ============================= */

/// Metrics collected over one experiment run.
///
/// Serializable so results can be exported, reloaded, and compared across
/// runs; counts and percentile inputs survive the JSON round trip intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_type: String,
    pub profile: String,
    pub duration_seconds: u64,
    pub started_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub actual_duration_seconds: f64,
    #[serde(default)]
    pub total_generated: u64,
    #[serde(default)]
    pub total_processed: u64,
    #[serde(default)]
    pub total_skipped: u64,
    #[serde(default)]
    pub total_failed: u64,
    #[serde(default)]
    pub latencies_ms: Vec<f64>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub stage_timings_ms: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ExperimentResult {
    pub fn new(experiment_type: &str, profile: &str, duration_seconds: u64) -> Self {
        ExperimentResult {
            experiment_type: experiment_type.to_string(),
            profile: profile.to_string(),
            duration_seconds,
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            actual_duration_seconds: 0.0,
            total_generated: 0,
            total_processed: 0,
            total_skipped: 0,
            total_failed: 0,
            latencies_ms: Vec::new(),
            errors: Vec::new(),
            stage_timings_ms: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn record_generated(&mut self) {
        self.total_generated += 1;
    }

    pub fn record_processed(&mut self, latency_ms: f64) {
        self.total_processed += 1;
        self.latencies_ms.push(latency_ms);
    }

    pub fn record_skipped(&mut self) {
        self.total_skipped += 1;
    }

    pub fn record_failed(&mut self, error: &str) {
        self.total_failed += 1;
        self.errors.push(error.to_string());
    }

    pub fn record_stage_timing(&mut self, stage: &str, duration_ms: f64) {
        self.stage_timings_ms.entry(stage.to_string()).or_default().push(duration_ms);
    }

    pub fn finish(&mut self, actual_duration_seconds: f64) {
        self.finished_at = Some(chrono::Utc::now().to_rfc3339());
        self.actual_duration_seconds = actual_duration_seconds;
    }

    pub fn success_rate(&self) -> f64 {
        let attempted = self.total_processed + self.total_failed;
        if attempted == 0 {
            return 0.0;
        }
        self.total_processed as f64 / attempted as f64 * 100.0
    }

    pub fn throughput_per_second(&self) -> f64 {
        if self.actual_duration_seconds <= 0.0 {
            return 0.0;
        }
        self.total_processed as f64 / self.actual_duration_seconds
    }

    pub fn latency_stats(&self) -> Option<LatencyStats> {
        if self.latencies_ms.is_empty() {
            return None;
        }
        let mut sorted = self.latencies_ms.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite latencies"));
        Some(LatencyStats {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            median: percentile(&sorted, 50),
            p95: percentile(&sorted, 95),
            p99: percentile(&sorted, 99),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatencyStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
}

/* ============================= REPORTER ============================= */

/// Renders experiment results as text summaries, JSON, and CSV.
pub struct Reporter<'a> {
    result: &'a ExperimentResult,
}

impl<'a> Reporter<'a> {
    pub fn new(result: &'a ExperimentResult) -> Self {
        Reporter { result }
    }

    pub fn summary(&self) -> String {
        let r = self.result;
        let mut lines = vec![
            "=".repeat(60),
            "TerraFix Experiment Report".to_string(),
            "=".repeat(60),
            String::new(),
            format!("Experiment Type: {}", r.experiment_type),
            format!("Workload Profile: {}", r.profile),
            format!("Start Time: {}", r.started_at),
            format!(
                "End Time: {}",
                r.finished_at.as_deref().unwrap_or("In Progress")
            ),
            format!(
                "Duration: {:.1}s (configured: {}s)",
                r.actual_duration_seconds, r.duration_seconds
            ),
            String::new(),
            "-".repeat(40),
            "Processing Summary".to_string(),
            "-".repeat(40),
            format!("Total Generated: {}", r.total_generated),
            format!("Total Processed: {}", r.total_processed),
            format!("Total Skipped: {}", r.total_skipped),
            format!("Total Failed: {}", r.total_failed),
            format!("Success Rate: {:.1}%", r.success_rate()),
            format!("Throughput: {:.2} violations/second", r.throughput_per_second()),
            String::new(),
        ];

        if let Some(stats) = r.latency_stats() {
            lines.extend([
                "-".repeat(40),
                "Latency Statistics (ms)".to_string(),
                "-".repeat(40),
                format!("Min: {:.1}", stats.min),
                format!("Max: {:.1}", stats.max),
                format!("Mean: {:.1}", stats.mean),
                format!("Median: {:.1}", stats.median),
                format!("P95: {:.1}", stats.p95),
                format!("P99: {:.1}", stats.p99),
                String::new(),
            ]);
        }

        if !r.stage_timings_ms.is_empty() {
            lines.push("-".repeat(40));
            lines.push("Stage Timing Breakdown (ms avg)".to_string());
            lines.push("-".repeat(40));
            for (stage, timings) in &r.stage_timings_ms {
                if !timings.is_empty() {
                    let avg = timings.iter().sum::<f64>() / timings.len() as f64;
                    lines.push(format!("{stage}: {avg:.1}"));
                }
            }
            lines.push(String::new());
        }

        if !r.errors.is_empty() {
            lines.push("-".repeat(40));
            lines.push(format!("Errors ({} total)", r.errors.len()));
            lines.push("-".repeat(40));
            let mut unique: Vec<&String> = r.errors.iter().collect();
            unique.sort();
            unique.dedup();
            for error in unique.iter().take(5) {
                let excerpt: String = error.chars().take(80).collect();
                lines.push(format!("  - {excerpt}"));
            }
            lines.push(String::new());
        }

        lines.push("=".repeat(60));
        lines.join("\n")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self.result)
            .map_err(|e| Error::config(format!("failed to serialize result: {e}"), None))
    }

    pub fn export_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .map_err(|e| Error::config(format!("failed to write {}: {e}", path.display()), None))
    }

    /// Single-row CSV with header.
    pub fn to_csv(&self) -> String {
        let r = self.result;
        let stats = r.latency_stats();
        let field = |f: fn(&LatencyStats) -> f64| {
            stats.as_ref().map(|s| format!("{:.2}", f(s))).unwrap_or_default()
        };

        let header = "experiment_type,profile,duration_configured_s,duration_actual_s,\
                      total_generated,total_processed,total_skipped,total_failed,\
                      success_rate_percent,throughput_per_second,\
                      latency_min_ms,latency_max_ms,latency_mean_ms,latency_median_ms,\
                      latency_p95_ms,latency_p99_ms,error_count";
        let row = format!(
            "{},{},{},{:.2},{},{},{},{},{:.1},{:.2},{},{},{},{},{},{},{}",
            r.experiment_type,
            r.profile,
            r.duration_seconds,
            r.actual_duration_seconds,
            r.total_generated,
            r.total_processed,
            r.total_skipped,
            r.total_failed,
            r.success_rate(),
            r.throughput_per_second(),
            field(|s| s.min),
            field(|s| s.max),
            field(|s| s.mean),
            field(|s| s.median),
            field(|s| s.p95),
            field(|s| s.p99),
            r.errors.len(),
        );
        format!("{header}\n{row}\n")
    }

    pub fn export_csv(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_csv())
            .map_err(|e| Error::config(format!("failed to write {}: {e}", path.display()), None))
    }
}

/// Side-by-side comparison of several experiment results.
pub fn comparison_report(results: &[ExperimentResult]) -> String {
    let mut lines = vec![
        "=".repeat(70),
        "TerraFix Experiment Comparison Report".to_string(),
        "=".repeat(70),
        String::new(),
        format!(
            "{:<20} {:<15} {:<12} {:<15} {:<10}",
            "Experiment", "Profile", "Processed", "Throughput", "Success %"
        ),
        "-".repeat(70),
    ];

    for r in results {
        lines.push(format!(
            "{:<20} {:<15} {:<12} {:<15.2} {:<10.1}",
            r.experiment_type,
            r.profile,
            r.total_processed,
            r.throughput_per_second(),
            r.success_rate(),
        ));
    }

    lines.push(String::new());
    lines.push("=".repeat(70));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ExperimentResult {
        let mut r = ExperimentResult::new("throughput", "steady", 60);
        for _ in 0..10 {
            r.record_generated();
        }
        for i in 0..8 {
            r.record_processed(100.0 + f64::from(i) * 10.0);
        }
        r.record_skipped();
        r.record_failed("Simulated processing failure");
        r.record_stage_timing("inference", 50.0);
        r.record_stage_timing("inference", 70.0);
        r.finish(60.0);
        r
    }

    // ── rates ──

    #[test]
    fn test_success_rate() {
        let r = sample_result();
        // 8 processed, 1 failed → 8/9
        assert!((r.success_rate() - 88.888).abs() < 0.01);
    }

    #[test]
    fn test_success_rate_empty_is_zero() {
        let r = ExperimentResult::new("throughput", "steady", 60);
        assert_eq!(r.success_rate(), 0.0);
    }

    #[test]
    fn test_throughput() {
        let r = sample_result();
        assert!((r.throughput_per_second() - 8.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_throughput_zero_duration() {
        let r = ExperimentResult::new("throughput", "steady", 60);
        assert_eq!(r.throughput_per_second(), 0.0);
    }

    // ── latency stats ──

    #[test]
    fn test_latency_stats() {
        let r = sample_result();
        let stats = r.latency_stats().unwrap();
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 170.0);
        assert!((stats.mean - 135.0).abs() < 1e-9);
    }

    #[test]
    fn test_latency_stats_empty_none() {
        let r = ExperimentResult::new("throughput", "steady", 60);
        assert!(r.latency_stats().is_none());
    }

    // ── JSON round trip ──

    #[test]
    fn test_json_roundtrip_preserves_counts_and_percentiles() {
        let r = sample_result();
        let json = Reporter::new(&r).to_json().unwrap();
        let back: ExperimentResult = serde_json::from_str(&json).unwrap();

        assert_eq!(back.total_generated, r.total_generated);
        assert_eq!(back.total_processed, r.total_processed);
        assert_eq!(back.total_skipped, r.total_skipped);
        assert_eq!(back.total_failed, r.total_failed);
        assert_eq!(back.latency_stats(), r.latency_stats());
        assert_eq!(back.stage_timings_ms, r.stage_timings_ms);
    }

    // ── summary ──

    #[test]
    fn test_summary_contains_key_fields() {
        let r = sample_result();
        let summary = Reporter::new(&r).summary();
        assert!(summary.contains("Experiment Type: throughput"));
        assert!(summary.contains("Total Generated: 10"));
        assert!(summary.contains("Total Processed: 8"));
        assert!(summary.contains("Latency Statistics"));
        assert!(summary.contains("Stage Timing Breakdown"));
        assert!(summary.contains("Simulated processing failure"));
    }

    #[test]
    fn test_summary_without_latencies_omits_section() {
        let r = ExperimentResult::new("throughput", "steady", 60);
        let summary = Reporter::new(&r).summary();
        assert!(!summary.contains("Latency Statistics"));
    }

    // ── CSV ──

    #[test]
    fn test_csv_shape() {
        let r = sample_result();
        let csv = Reporter::new(&r).to_csv();
        let lines: Vec<&str> = csv.trim().lines().collect();
        assert_eq!(lines.len(), 2);
        let header_cols = lines[0].split(',').count();
        let row_cols = lines[1].split(',').count();
        assert_eq!(header_cols, row_cols);
        assert!(lines[1].starts_with("throughput,steady,60,"));
    }

    #[test]
    fn test_export_files() {
        let dir = tempfile::tempdir().unwrap();
        let r = sample_result();
        let reporter = Reporter::new(&r);
        let json_path = dir.path().join("result.json");
        let csv_path = dir.path().join("result.csv");
        reporter.export_json(&json_path).unwrap();
        reporter.export_csv(&csv_path).unwrap();
        assert!(json_path.exists());
        assert!(csv_path.exists());
    }

    // ── comparison ──

    #[test]
    fn test_comparison_report_lists_all() {
        let a = sample_result();
        let mut b = sample_result();
        b.experiment_type = "resilience".to_string();
        let report = comparison_report(&[a, b]);
        assert!(report.contains("throughput"));
        assert!(report.contains("resilience"));
        assert!(report.contains("Comparison Report"));
    }
}
