use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use terrafix::api::{ApiState, build_router};

fn violation(test_id: &str, arn: &str) -> Value {
    json!({
        "test_id": test_id,
        "test_name": "S3 Bucket Block Public Access",
        "resource_arn": arn,
        "resource_type": "AWS::S3::Bucket",
        "failure_reason": "S3 bucket does not have public access blocked",
        "severity": "high",
        "framework": "SOC2",
        "failed_at": "2026-03-01T10:30:00Z",
        "current_state": {"block_public_acls": false},
        "required_state": {"block_public_acls": true},
    })
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_webhook_end_to_end_mock() {
    let app = build_router(ApiState::mock(0.0, 0.0));

    let resp = app
        .oneshot(post("/webhook", violation("s3-bpa-01", "arn:aws:s3:::demo")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["success"], true);
    assert!(body["pr_url"].as_str().unwrap().starts_with("https://"));
    assert_eq!(body["fingerprint"].as_str().unwrap().len(), 64);
    assert!(body["message"].as_str().unwrap().contains("Mock"));
}

#[tokio::test]
async fn test_webhook_fingerprint_stable_across_resubmission() {
    // Re-submitting the same violation with a different detection
    // timestamp must produce the same fingerprint.
    let state = ApiState::mock(0.0, 0.0);
    let app = build_router(state);

    let first = json_body(
        app.clone()
            .oneshot(post("/webhook", violation("s3-bpa-01", "arn:aws:s3:::demo")))
            .await
            .unwrap(),
    )
    .await;

    let mut resubmitted = violation("s3-bpa-01", "arn:aws:s3:::demo");
    resubmitted["failed_at"] = json!("2026-04-01T00:00:00Z");
    let second = json_body(app.oneshot(post("/webhook", resubmitted)).await.unwrap()).await;

    assert_eq!(first["fingerprint"], second["fingerprint"]);
}

#[tokio::test]
async fn test_webhook_distinct_resources_distinct_fingerprints() {
    let app = build_router(ApiState::mock(0.0, 0.0));

    let a = json_body(
        app.clone()
            .oneshot(post("/webhook", violation("s3-bpa-01", "arn:aws:s3:::alpha")))
            .await
            .unwrap(),
    )
    .await;
    let b = json_body(
        app.oneshot(post("/webhook", violation("s3-bpa-01", "arn:aws:s3:::beta")))
            .await
            .unwrap(),
    )
    .await;

    assert_ne!(a["fingerprint"], b["fingerprint"]);
}

#[tokio::test]
async fn test_batch_reports_totals() {
    let app = build_router(ApiState::mock(0.0, 0.0));

    let batch = json!([
        violation("s3-bpa-01", "arn:aws:s3:::one"),
        violation("s3-versioning", "arn:aws:s3:::two"),
        {"not": "a violation"},
    ]);
    let resp = app.oneshot(post("/batch", batch)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["successful"], 2);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["results"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_status_reflects_traffic() {
    let state = ApiState::mock(0.0, 0.0);
    let app = build_router(state);

    for _ in 0..3 {
        let _ = app
            .clone()
            .oneshot(post("/webhook", violation("s3-bpa-01", "arn:aws:s3:::demo")))
            .await
            .unwrap();
    }

    let resp = app
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["stats"]["total_requests"], 3);
    assert_eq!(body["stats"]["successful_requests"], 3);
}

#[tokio::test]
async fn test_metrics_exposition_has_required_series() {
    let app = build_router(ApiState::mock(0.0, 0.0));

    let _ = app
        .clone()
        .oneshot(post("/webhook", violation("s3-bpa-01", "arn:aws:s3:::demo")))
        .await
        .unwrap();

    let resp = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("requests_total"));
    assert!(text.contains("requests_per_second"));
    assert!(text.contains("request_latency_ms"));
}

#[tokio::test]
async fn test_lifecycle_ready_then_shutdown() {
    let state = ApiState::mock(0.0, 0.0);
    let app = build_router(state.clone());

    // Before startup completes
    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Ready
    state.set_ready(true);
    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Shutdown flips readiness; health stays up while the process lives
    state.set_shutting_down();
    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_configure_drives_failure_mode() {
    let state = ApiState::mock(0.0, 0.0);
    let app = build_router(state);

    // Force every mock request to fail
    let resp = app
        .clone()
        .oneshot(post("/configure", json!({"failure_rate": 1.0})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(post("/webhook", violation("s3-bpa-01", "arn:aws:s3:::demo")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Back to healthy
    let _ = app
        .clone()
        .oneshot(post("/configure", json!({"failure_rate": 0.0})))
        .await
        .unwrap();
    let resp = app
        .oneshot(post("/webhook", violation("s3-bpa-01", "arn:aws:s3:::demo")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
