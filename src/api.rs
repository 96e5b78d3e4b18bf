use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::metrics::{self, COLLECTOR, REQUESTS_PER_SECOND, REQUESTS_TOTAL};
use crate::monitor::{Violation, fingerprint};
use crate::orchestrator::{self, PipelineDeps};

/* ============================= REQUEST STATS ============================= */

/// Request counters and latency window for the status endpoint.
#[derive(Debug, Default)]
pub struct RequestStats {
    total: u64,
    successful: u64,
    failed: u64,
    latencies_ms: Vec<f64>,
}

impl RequestStats {
    fn record(&mut self, latency_ms: f64, success: bool) {
        self.total += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.latencies_ms.push(latency_ms);
        if self.latencies_ms.len() > 1000 {
            let excess = self.latencies_ms.len() - 1000;
            self.latencies_ms.drain(..excess);
        }
    }

    fn to_json(&self, uptime: Duration) -> Value {
        let mut sorted = self.latencies_ms.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite latencies"));

        let avg = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };
        let rps = if uptime.as_secs_f64() > 0.0 {
            self.total as f64 / uptime.as_secs_f64()
        } else {
            0.0
        };
        let success_rate = if self.total > 0 {
            self.successful as f64 / self.total as f64 * 100.0
        } else {
            0.0
        };

        json!({
            "total_requests": self.total,
            "successful_requests": self.successful,
            "failed_requests": self.failed,
            "success_rate_percent": success_rate,
            "uptime_seconds": uptime.as_secs_f64(),
            "requests_per_second": rps,
            "latency_ms": {
                "avg": avg,
                "min": sorted.first().copied().unwrap_or(0.0),
                "max": sorted.last().copied().unwrap_or(0.0),
                "p50": metrics::percentile(&sorted, 50),
                "p95": metrics::percentile(&sorted, 95),
                "p99": metrics::percentile(&sorted, 99),
            },
        })
    }

    fn reset(&mut self) {
        *self = RequestStats::default();
    }
}

/* ============================= MOCK MODE ============================= */

/// Simulates the remediation pipeline: a fixed delay plus a Bernoulli
/// simulated failure. Lets the experiment harness and load tests drive the
/// API without any external service.
pub struct MockProcessor {
    pub latency_ms: f64,
    pub failure_rate: f64,
    rng: StdRng,
}

impl MockProcessor {
    pub fn new(latency_ms: f64, failure_rate: f64) -> Self {
        MockProcessor { latency_ms, failure_rate, rng: StdRng::from_entropy() }
    }

    fn draw_failure(&mut self) -> bool {
        self.failure_rate > 0.0 && self.rng.r#gen::<f64>() < self.failure_rate
    }
}

/// Deterministic mock PR URL derived from the test id.
pub fn mock_pr_url(test_id: &str) -> String {
    let digest = Sha256::digest(test_id.as_bytes());
    let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 10000;
    format!("https://github.com/mock-org/mock-repo/pull/{n}")
}

/* ============================= STATE ============================= */

pub struct ApiState {
    started: Instant,
    ready: AtomicBool,
    shutting_down: AtomicBool,
    stats: Mutex<RequestStats>,
    mock: Option<Mutex<MockProcessor>>,
    deps: Option<Arc<PipelineDeps>>,
}

impl ApiState {
    /// Mock-mode server: no external dependencies.
    pub fn mock(latency_ms: f64, failure_rate: f64) -> Arc<Self> {
        Arc::new(ApiState {
            started: Instant::now(),
            ready: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            stats: Mutex::new(RequestStats::default()),
            mock: Some(Mutex::new(MockProcessor::new(latency_ms, failure_rate))),
            deps: None,
        })
    }

    /// Real-mode server backed by the full pipeline.
    pub fn real(deps: Arc<PipelineDeps>) -> Arc<Self> {
        Arc::new(ApiState {
            started: Instant::now(),
            ready: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            stats: Mutex::new(RequestStats::default()),
            mock: None,
            deps: Some(deps),
        })
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_shutting_down(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_mock(&self) -> bool {
        self.mock.is_some()
    }

    fn record_request(&self, started: Instant, success: bool) {
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.stats.lock().expect("stats lock").record(latency_ms, success);
        COLLECTOR.record_timing(metrics::REQUEST_LATENCY_MS, &[], latency_ms);
        let label = if success { "success" } else { "failure" };
        REQUESTS_TOTAL.with_label_values(&[label]).inc();
    }
}

/* ============================= ROUTER ============================= */

pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/batch", post(batch_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/configure", post(configure_handler))
        .route("/stats/reset", post(stats_reset_handler))
        .with_state(state)
}

/// Serve until the shutdown channel fires.
pub async fn serve(
    state: Arc<ApiState>,
    addr: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server on {addr}"))?;

    info!(addr = %addr, mock_mode = state.is_mock(), "api_server_started");
    state.set_ready(true);

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            shutdown_state.set_shutting_down();
            shutdown_state.set_ready(false);
        })
        .await?;

    Ok(())
}

/* ============================= PROCESSING ============================= */

async fn process_one(state: &ApiState, violation: &Violation) -> Result<Value, String> {
    if let Some(mock) = &state.mock {
        let (latency_ms, fail) = {
            let mut mock = mock.lock().expect("mock lock");
            (mock.latency_ms, mock.draw_failure())
        };
        tokio::time::sleep(Duration::from_secs_f64(latency_ms / 1000.0)).await;
        if fail {
            return Err("Simulated processing failure".to_string());
        }
        return Ok(json!({
            "success": true,
            "pr_url": mock_pr_url(&violation.test_id),
            "fingerprint": fingerprint(violation),
            "message": "Mock processing completed successfully",
        }));
    }

    if let Some(deps) = &state.deps {
        let outcome = orchestrator::process_violation(violation, deps).await;
        if outcome.success {
            let message = if outcome.skipped {
                "Already processed, skipped"
            } else {
                "Processing completed"
            };
            return Ok(json!({
                "success": true,
                "pr_url": outcome.pr_url.unwrap_or_default(),
                "fingerprint": outcome.fingerprint,
                "message": message,
            }));
        }
        return Err(outcome.error.unwrap_or_else(|| "processing failed".to_string()));
    }

    Err("no processing backend configured".to_string())
}

fn parse_violation(raw: &Value) -> Result<Violation, String> {
    let violation: Violation =
        serde_json::from_value(raw.clone()).map_err(|e| format!("Invalid violation: {e}"))?;
    violation.validate().map_err(|e| e.to_string())?;
    Ok(violation)
}

/* ============================= HANDLERS ============================= */

async fn webhook_handler(
    State(state): State<Arc<ApiState>>,
    body: std::result::Result<Json<Value>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    let started = Instant::now();

    let Ok(Json(raw)) = body else {
        state.record_request(started, false);
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Invalid JSON"})));
    };

    let violation = match parse_violation(&raw) {
        Ok(v) => v,
        Err(e) => {
            state.record_request(started, false);
            return (StatusCode::BAD_REQUEST, Json(json!({"error": e})));
        }
    };

    match process_one(&state, &violation).await {
        Ok(result) => {
            state.record_request(started, true);
            (StatusCode::OK, Json(result))
        }
        Err(e) => {
            state.record_request(started, false);
            error!(error = %e, "webhook_processing_failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e})))
        }
    }
}

async fn batch_handler(
    State(state): State<Arc<ApiState>>,
    body: std::result::Result<Json<Value>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    let started = Instant::now();

    let Ok(Json(raw)) = body else {
        state.record_request(started, false);
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Invalid JSON"})));
    };

    let Some(entries) = raw.as_array() else {
        state.record_request(started, false);
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Expected array of violations"})),
        );
    };

    let mut results = Vec::with_capacity(entries.len());
    let mut successful = 0usize;
    for entry in entries {
        match parse_violation(entry) {
            Ok(violation) => match process_one(&state, &violation).await {
                Ok(result) => {
                    successful += 1;
                    results.push(result);
                }
                Err(e) => results.push(json!({"success": false, "error": e})),
            },
            Err(e) => results.push(json!({"success": false, "error": e})),
        }
    }

    let all_ok = successful == entries.len();
    state.record_request(started, all_ok);

    (
        StatusCode::OK,
        Json(json!({
            "total": results.len(),
            "successful": successful,
            "failed": results.len() - successful,
            "results": results,
        })),
    )
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

async fn ready_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let ready = state.ready.load(Ordering::SeqCst);
    let shutting_down = state.shutting_down.load(Ordering::SeqCst);
    if ready && !shutting_down {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "not ready"})))
    }
}

async fn status_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let stats = state.stats.lock().expect("stats lock").to_json(state.started.elapsed());
    (
        StatusCode::OK,
        Json(json!({
            "status": "running",
            "mock_mode": state.is_mock(),
            "stats": stats,
            "pipeline": COLLECTOR.snapshot(),
        })),
    )
}

async fn metrics_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let uptime = state.started.elapsed().as_secs_f64();
    let total = state.stats.lock().expect("stats lock").total;
    if uptime > 0.0 {
        REQUESTS_PER_SECOND.set(total as f64 / uptime);
    }
    (StatusCode::OK, metrics::encode_prometheus())
}

async fn configure_handler(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let Some(mock) = &state.mock else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "configure is only available in mock mode"})),
        );
    };

    let mut mock = mock.lock().expect("mock lock");
    if let Some(latency) = body.get("latency_ms").and_then(Value::as_f64) {
        mock.latency_ms = latency.max(0.0);
    }
    if let Some(rate) = body.get("failure_rate").and_then(Value::as_f64) {
        mock.failure_rate = rate.clamp(0.0, 1.0);
    }

    info!(
        latency_ms = mock.latency_ms,
        failure_rate = mock.failure_rate,
        "mock_parameters_updated"
    );
    (
        StatusCode::OK,
        Json(json!({
            "latency_ms": mock.latency_ms,
            "failure_rate": mock.failure_rate,
        })),
    )
}

async fn stats_reset_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.stats.lock().expect("stats lock").reset();
    (StatusCode::OK, Json(json!({"message": "Stats reset"})))
}
