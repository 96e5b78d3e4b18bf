use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::MonitorAuth;
use crate::errors::{Error, Result};
use crate::rate_limit::MANAGEMENT_LIMITER;

/* ============================= SEVERITY ============================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/* ============================= VIOLATION ============================= */

/// One compliance finding reported by the monitor.
///
/// Known fields are lifted to typed form; anything else the monitor sends
/// is retained in `extra` so enrichment stays extensible without schema
/// churn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub test_id: String,
    pub test_name: String,
    pub resource_arn: String,
    pub resource_type: String,
    pub failure_reason: String,
    #[serde(default)]
    pub severity: Severity,
    pub framework: String,
    pub failed_at: String,
    #[serde(default)]
    pub current_state: Map<String, Value>,
    #[serde(default)]
    pub required_state: Map<String, Value>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub resource_details: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Violation {
    /// Identifier and canonical resource id must be non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.test_id.trim().is_empty() {
            return Err(Error::monitor_api("violation is missing test_id", None));
        }
        if self.resource_arn.trim().is_empty() {
            return Err(Error::monitor_api("violation is missing resource_arn", None));
        }
        Ok(())
    }
}

/// Deterministic dedup key over (test id, resource arn).
///
/// The detection timestamp is deliberately excluded so a recurring
/// violation maps onto the same fingerprint and cannot spawn a second
/// pull request on regression.
pub fn fingerprint(violation: &Violation) -> String {
    let signature = format!("{}-{}", violation.test_id, violation.resource_arn);
    let digest = Sha256::digest(signature.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parse the monitor's ISO-8601 timestamps. Unparseable values sort as the
/// minimum so they are never silently dropped by a `since` filter.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/* ============================= CLIENT ============================= */

const PAGE_SIZE: u32 = 50;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LIMITER_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the compliance monitor's paginated REST API.
pub struct MonitorClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<String>,
    credentials: Option<(String, String)>,
}

impl MonitorClient {
    /// Construct the client, running the OAuth client-credentials exchange
    /// when no pre-issued token was configured.
    pub async fn new(base_url: &str, auth: &MonitorAuth) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("terrafix/0.1.0")
            .build()
            .map_err(|e| Error::monitor_api(format!("failed to build HTTP client: {e}"), None))?;

        let base_url = base_url.trim_end_matches('/').to_string();

        let (token, credentials) = match auth {
            MonitorAuth::Token(token) => (token.clone(), None),
            MonitorAuth::ClientCredentials { client_id, client_secret } => {
                let token =
                    exchange_token(&http, &base_url, client_id, client_secret).await?;
                (token, Some((client_id.clone(), client_secret.clone())))
            }
        };

        info!(base_url = %base_url, "monitor_client_initialized");

        Ok(MonitorClient { http, base_url, token: RwLock::new(token), credentials })
    }

    /// Fetch all currently failing tests, paginating until exhausted.
    ///
    /// `since` is applied client-side against each record's parsed
    /// `failed_at`. Records that fail schema validation are skipped with a
    /// warning; enrichment failures degrade silently.
    pub async fn fetch_failing(
        &self,
        since: Option<DateTime<Utc>>,
        frameworks: Option<&[String]>,
    ) -> Result<Vec<Violation>> {
        let mut violations = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.fetch_page(cursor.as_deref(), frameworks).await?;

            let data = page
                .pointer("/results/data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for raw in data {
                let mut violation: Violation = match serde_json::from_value(raw.clone()) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "skipping_unparseable_violation");
                        continue;
                    }
                };
                if violation.validate().is_err() {
                    warn!(test_id = %violation.test_id, "skipping_invalid_violation");
                    continue;
                }
                if let Some(since) = since
                    && parse_timestamp(&violation.failed_at) <= since
                {
                    continue;
                }
                self.enrich(&mut violation).await;
                violations.push(violation);
            }

            let page_info = page.pointer("/results/pageInfo").cloned().unwrap_or(Value::Null);
            let has_next =
                page_info.get("hasNextPage").and_then(Value::as_bool).unwrap_or(false);
            if !has_next {
                break;
            }
            cursor = page_info
                .get("endCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        info!(count = violations.len(), "fetched_failing_tests");
        Ok(violations)
    }

    /// Service-loop convenience: everything newer than the last check.
    pub async fn fetch_failing_since(
        &self,
        last_check: Option<DateTime<Utc>>,
    ) -> Result<Vec<Violation>> {
        self.fetch_failing(last_check, None).await
    }

    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        frameworks: Option<&[String]>,
    ) -> Result<Value> {
        MANAGEMENT_LIMITER.acquire(LIMITER_TIMEOUT).await?;

        let mut attempted_reauth = false;
        loop {
            let mut request = self
                .http
                .get(format!("{}/v1/tests", self.base_url))
                .bearer_auth(self.token.read().await.clone())
                .query(&[("status", "failing")])
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(cursor) = cursor {
                request = request.query(&[("pageCursor", cursor)]);
            }
            if let Some(frameworks) = frameworks {
                request = request.query(&[("frameworks", frameworks.join(","))]);
            }

            let response = request.send().await.map_err(|e| {
                Error::monitor_api(format!("monitor API network error: {e}"), None)
            })?;

            let status = response.status();
            if status.as_u16() == 401 && !attempted_reauth {
                if let Some((client_id, client_secret)) = &self.credentials {
                    info!("monitor_token_expired_reauthenticating");
                    let fresh =
                        exchange_token(&self.http, &self.base_url, client_id, client_secret)
                            .await?;
                    *self.token.write().await = fresh;
                    attempted_reauth = true;
                    continue;
                }
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::monitor_api(
                    format!("monitor API request failed with {status}: {}", excerpt(&body)),
                    Some(status.as_u16()),
                ));
            }

            return response.json().await.map_err(|e| {
                Error::monitor_api(format!("monitor API returned invalid JSON: {e}"), None)
            });
        }
    }

    /// Fetch extended resource metadata. Failures never fail the fetch;
    /// the violation is kept without enrichment.
    async fn enrich(&self, violation: &mut Violation) {
        let Some(resource_id) = violation.resource_id.clone() else {
            return;
        };

        if MANAGEMENT_LIMITER.acquire(LIMITER_TIMEOUT).await.is_err() {
            warn!(resource_id = %resource_id, "enrichment_skipped_rate_limited");
            return;
        }

        let url = format!("{}/v1/resources/{}", self.base_url, resource_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token.read().await.clone())
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                Ok(Value::Object(details)) => {
                    violation.resource_details = details;
                    debug!(resource_id = %resource_id, "violation_enriched");
                }
                Ok(_) | Err(_) => {
                    warn!(resource_id = %resource_id, "enrichment_response_not_an_object");
                }
            },
            Ok(resp) => {
                warn!(
                    resource_id = %resource_id,
                    status = resp.status().as_u16(),
                    "enrichment_request_failed"
                );
            }
            Err(e) => {
                warn!(resource_id = %resource_id, error = %e, "enrichment_network_error");
            }
        }
    }
}

async fn exchange_token(
    http: &reqwest::Client,
    base_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<String> {
    let response = http
        .post(format!("{base_url}/oauth/token"))
        .json(&serde_json::json!({
            "client_id": client_id,
            "client_secret": client_secret,
            "grant_type": "client_credentials",
            "scope": "vanta-api.all:read",
        }))
        .send()
        .await
        .map_err(|e| Error::monitor_api(format!("OAuth exchange network error: {e}"), None))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::monitor_api(
            format!("OAuth exchange failed with {status}"),
            Some(status.as_u16()),
        ));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| Error::monitor_api(format!("OAuth response invalid JSON: {e}"), None))?;
    body.get("access_token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::monitor_api("OAuth response missing access_token", None))
}

fn excerpt(body: &str) -> String {
    body.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(test_id: &str, arn: &str, failed_at: &str) -> Violation {
        Violation {
            test_id: test_id.into(),
            test_name: "S3 Bucket Block Public Access".into(),
            resource_arn: arn.into(),
            resource_type: "AWS::S3::Bucket".into(),
            failure_reason: "public access not blocked".into(),
            severity: Severity::High,
            framework: "SOC2".into(),
            failed_at: failed_at.into(),
            current_state: Map::new(),
            required_state: Map::new(),
            resource_id: None,
            resource_details: Map::new(),
            extra: Map::new(),
        }
    }

    // ── fingerprint ──

    #[test]
    fn test_fingerprint_stable_across_timestamps() {
        let a = violation("s3-bpa-01", "arn:aws:s3:::demo", "2026-01-01T00:00:00Z");
        let b = violation("s3-bpa-01", "arn:aws:s3:::demo", "2026-02-15T12:30:00Z");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_differs_by_test_id() {
        let a = violation("s3-bpa-01", "arn:aws:s3:::demo", "t");
        let b = violation("s3-versioning", "arn:aws:s3:::demo", "t");
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_differs_by_resource() {
        let a = violation("s3-bpa-01", "arn:aws:s3:::demo", "t");
        let b = violation("s3-bpa-01", "arn:aws:s3:::other", "t");
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_is_hex256() {
        let fp = fingerprint(&violation("a", "b", "c"));
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    // ── timestamps ──

    #[test]
    fn test_parse_timestamp_with_trailing_z() {
        let ts = parse_timestamp("2026-03-01T10:30:00Z");
        assert_eq!(ts.to_rfc3339(), "2026-03-01T10:30:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_with_offset() {
        let ts = parse_timestamp("2026-03-01T10:30:00+02:00");
        assert_eq!(ts.to_rfc3339(), "2026-03-01T08:30:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_naive_assumed_utc() {
        let ts = parse_timestamp("2026-03-01T10:30:00.500");
        assert_eq!(ts.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_parse_timestamp_garbage_sorts_minimum() {
        assert_eq!(parse_timestamp("not-a-timestamp"), DateTime::<Utc>::MIN_UTC);
        assert_eq!(parse_timestamp(""), DateTime::<Utc>::MIN_UTC);
    }

    // ── validation ──

    #[test]
    fn test_validate_requires_test_id() {
        let v = violation("", "arn:aws:s3:::demo", "t");
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_validate_requires_resource_arn() {
        let v = violation("s3-bpa-01", "  ", "t");
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_complete_violation() {
        assert!(violation("s3-bpa-01", "arn:aws:s3:::demo", "t").validate().is_ok());
    }

    // ── serde ──

    #[test]
    fn test_violation_parses_monitor_payload() {
        let raw = serde_json::json!({
            "test_id": "s3-bpa-01",
            "test_name": "S3 Bucket Block Public Access",
            "resource_arn": "arn:aws:s3:::demo",
            "resource_type": "AWS::S3::Bucket",
            "failure_reason": "public access not blocked",
            "severity": "high",
            "framework": "SOC2",
            "failed_at": "2026-03-01T10:30:00Z",
            "current_state": {"block_public_acls": false},
            "required_state": {"block_public_acls": true},
        });
        let v: Violation = serde_json::from_value(raw).unwrap();
        assert_eq!(v.severity, Severity::High);
        assert_eq!(v.current_state["block_public_acls"], false);
    }

    #[test]
    fn test_violation_preserves_unknown_fields() {
        let raw = serde_json::json!({
            "test_id": "t", "test_name": "n", "resource_arn": "arn:x", "resource_type": "AWS::S3::Bucket",
            "failure_reason": "r", "severity": "low", "framework": "SOC2", "failed_at": "t",
            "remediation_hint": "enable versioning",
        });
        let v: Violation = serde_json::from_value(raw).unwrap();
        assert_eq!(v.extra["remediation_hint"], "enable versioning");

        // And the unknown field survives re-serialization
        let out = serde_json::to_value(&v).unwrap();
        assert_eq!(out["remediation_hint"], "enable versioning");
    }

    #[test]
    fn test_violation_missing_severity_defaults_medium() {
        let raw = serde_json::json!({
            "test_id": "t", "test_name": "n", "resource_arn": "arn:x", "resource_type": "AWS::S3::Bucket",
            "failure_reason": "r", "framework": "SOC2", "failed_at": "t",
        });
        let v: Violation = serde_json::from_value(raw).unwrap();
        assert_eq!(v.severity, Severity::Medium);
    }

    #[test]
    fn test_severity_labels() {
        assert_eq!(Severity::Critical.as_str(), "critical");
        assert_eq!(Severity::High.as_str(), "high");
        assert_eq!(Severity::Medium.as_str(), "medium");
        assert_eq!(Severity::Low.as_str(), "low");
    }
}
