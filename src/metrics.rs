use std::collections::BTreeMap;
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder,
};
use serde_json::json;

/* ============================= METRIC NAMES ============================= */

pub const VIOLATIONS_PROCESSED_TOTAL: &str = "violations_processed_total";
pub const VIOLATIONS_SUCCESSFUL_TOTAL: &str = "violations_successful_total";
pub const VIOLATIONS_SKIPPED_TOTAL: &str = "violations_skipped_total";
pub const VIOLATIONS_FAILED_TOTAL: &str = "violations_failed_total";
pub const PRS_CREATED_TOTAL: &str = "prs_created_total";
pub const API_ERRORS_TOTAL: &str = "api_errors_total";
pub const RETRIES_TOTAL: &str = "retries_total";
pub const QUEUE_DEPTH: &str = "queue_depth";
pub const ACTIVE_WORKERS: &str = "active_workers";
pub const LAST_POLL_TIMESTAMP: &str = "last_poll_timestamp";
pub const REQUEST_LATENCY_MS: &str = "request_latency_ms";

/// Named pipeline stages for per-stage latency analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchMonitor,
    CloneRepo,
    ParseTerraform,
    Inference,
    ValidateFix,
    CreatePr,
    TotalProcessing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchMonitor => "fetch_monitor",
            Stage::CloneRepo => "clone_repo",
            Stage::ParseTerraform => "parse_terraform",
            Stage::Inference => "inference",
            Stage::ValidateFix => "validate_fix",
            Stage::CreatePr => "create_pr",
            Stage::TotalProcessing => "total_processing",
        }
    }
}

/* ============================= COLLECTOR ============================= */

const MAX_SAMPLES_PER_SERIES: usize = 1000;

type Key = (String, Vec<(String, String)>);

#[derive(Default)]
struct Inner {
    counters: BTreeMap<Key, u64>,
    gauges: BTreeMap<Key, f64>,
    timings: BTreeMap<Key, Vec<f64>>,
}

/// Timing statistics over the bounded sample window.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Process-wide metrics collector.
///
/// Counters are monotonic, gauges are last-write-wins, and timings keep the
/// most recent 1000 samples per series to bound memory. All access goes
/// through a single lock; callers never hold it across await points.
pub struct Collector {
    inner: Mutex<Inner>,
    start: Instant,
}

impl Collector {
    fn new() -> Self {
        Collector { inner: Mutex::new(Inner::default()), start: Instant::now() }
    }

    fn key(name: &str, labels: &[(&str, &str)]) -> Key {
        let mut l: Vec<(String, String)> =
            labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        l.sort();
        (name.to_string(), l)
    }

    pub fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_by(name, labels, 1);
    }

    pub fn increment_by(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        let mut inner = self.inner.lock().expect("metrics lock");
        *inner.counters.entry(Self::key(name, labels)).or_insert(0) += value;
    }

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let mut inner = self.inner.lock().expect("metrics lock");
        inner.gauges.insert(Self::key(name, labels), value);
    }

    pub fn record_timing(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let mut inner = self.inner.lock().expect("metrics lock");
        let samples = inner.timings.entry(Self::key(name, labels)).or_default();
        samples.push(value);
        if samples.len() > MAX_SAMPLES_PER_SERIES {
            let excess = samples.len() - MAX_SAMPLES_PER_SERIES;
            samples.drain(..excess);
        }
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let inner = self.inner.lock().expect("metrics lock");
        inner.counters.get(&Self::key(name, labels)).copied().unwrap_or(0)
    }

    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let inner = self.inner.lock().expect("metrics lock");
        inner.gauges.get(&Self::key(name, labels)).copied()
    }

    pub fn timing_stats(&self, name: &str, labels: &[(&str, &str)]) -> Option<TimingStats> {
        let inner = self.inner.lock().expect("metrics lock");
        let samples = inner.timings.get(&Self::key(name, labels))?;
        stats_of(samples)
    }

    pub fn uptime(&self) -> Duration {
        self.start.elapsed()
    }

    /// Full snapshot as one JSON document.
    pub fn snapshot(&self) -> serde_json::Value {
        let inner = self.inner.lock().expect("metrics lock");

        let counters: serde_json::Map<String, serde_json::Value> = inner
            .counters
            .iter()
            .map(|(k, v)| (format_key(k), json!(v)))
            .collect();

        let gauges: serde_json::Map<String, serde_json::Value> = inner
            .gauges
            .iter()
            .map(|(k, v)| (format_key(k), json!(v)))
            .collect();

        let timings: serde_json::Map<String, serde_json::Value> = inner
            .timings
            .iter()
            .filter_map(|(k, samples)| {
                let s = stats_of(samples)?;
                Some((
                    format_key(k),
                    json!({
                        "count": s.count,
                        "min": s.min,
                        "max": s.max,
                        "mean": s.mean,
                        "p50": s.p50,
                        "p95": s.p95,
                        "p99": s.p99,
                    }),
                ))
            })
            .collect();

        json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime_seconds": self.start.elapsed().as_secs_f64(),
            "counters": counters,
            "gauges": gauges,
            "timings": timings,
        })
    }

    /// Reset to initial state. Used by tests and the stats-reset endpoint.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("metrics lock");
        inner.counters.clear();
        inner.gauges.clear();
        inner.timings.clear();
    }
}

fn format_key((name, labels): &Key) -> String {
    if labels.is_empty() {
        name.clone()
    } else {
        let rendered: Vec<String> =
            labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{}{{{}}}", name, rendered.join(","))
    }
}

fn stats_of(samples: &[f64]) -> Option<TimingStats> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite samples"));
    let sum: f64 = sorted.iter().sum();
    Some(TimingStats {
        count: sorted.len(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean: sum / sorted.len() as f64,
        p50: percentile(&sorted, 50),
        p95: percentile(&sorted, 95),
        p99: percentile(&sorted, 99),
    })
}

/// Nearest-rank percentile over pre-sorted values.
pub fn percentile(sorted: &[f64], pct: usize) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (sorted.len() * pct / 100).min(sorted.len() - 1);
    sorted[index]
}

/// Process-wide collector singleton.
pub static COLLECTOR: LazyLock<Collector> = LazyLock::new(Collector::new);

/* ============================= PROMETHEUS ============================= */

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        prometheus::Opts::new("requests_total", "Total HTTP requests by outcome"),
        &["status"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

pub static REQUEST_LATENCY_QUANTILES: LazyLock<GaugeVec> = LazyLock::new(|| {
    let g = GaugeVec::new(
        prometheus::Opts::new("request_latency_ms", "Request latency quantiles in milliseconds"),
        &["quantile"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

pub static REQUESTS_PER_SECOND: LazyLock<Gauge> = LazyLock::new(|| {
    let g = Gauge::new("requests_per_second", "Average request rate since startup")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

pub static STAGE_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let h = HistogramVec::new(
        prometheus::HistogramOpts::new("stage_duration_seconds", "Pipeline stage durations")
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["stage"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(h.clone())).expect("metric not yet registered");
    h
});

pub static PRS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("prs_created_total", "Pull requests opened")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

pub static UNMAPPED_TYPE_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        prometheus::Opts::new(
            "unmapped_type_total",
            "Monitor resource types missing from the Terraform mapping table",
        ),
        &["type"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

/// Record one pipeline stage duration in both the collector and the
/// prometheus histogram.
pub fn record_stage(stage: Stage, duration: Duration) {
    let secs = duration.as_secs_f64();
    COLLECTOR.record_timing(stage.as_str(), &[], secs);
    STAGE_SECONDS.with_label_values(&[stage.as_str()]).observe(secs);
}

/// Prometheus text exposition of the registry, with latency quantile gauges
/// refreshed from the collector's request-latency histogram first.
pub fn encode_prometheus() -> String {
    if let Some(stats) = COLLECTOR.timing_stats(REQUEST_LATENCY_MS, &[]) {
        REQUEST_LATENCY_QUANTILES.with_label_values(&["0.5"]).set(stats.p50);
        REQUEST_LATENCY_QUANTILES.with_label_values(&["0.95"]).set(stats.p95);
        REQUEST_LATENCY_QUANTILES.with_label_values(&["0.99"]).set(stats.p99);
    }

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => String::from_utf8(buffer).unwrap_or_default(),
        Err(_) => String::new(),
    }
}
