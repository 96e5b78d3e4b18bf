use thiserror::Error;

/* ============================= ERROR TAXONOMY ============================= */

/// All failure modes in the remediation pipeline.
///
/// Every variant carries a human-readable message plus enough context for
/// structured logging. `is_retryable` drives the orchestrator's retry
/// policy: transient API failures are retried with backoff, everything
/// else surfaces immediately.
#[derive(Debug, Error)]
pub enum Error {
    /// Monitor API request failed. Network errors and 5xx are retryable.
    #[error("{message}")]
    MonitorApi {
        message: String,
        status: Option<u16>,
        retryable: bool,
    },

    /// Terraform HCL could not be parsed. Never retried.
    #[error("{message}")]
    HclParse {
        message: String,
        file: Option<String>,
    },

    /// Inference endpoint call failed. Throttling and timeouts are
    /// retryable; validation and access errors are not.
    #[error("{message}")]
    Inference {
        message: String,
        code: Option<String>,
        retryable: bool,
    },

    /// Repository host API failure. 429 and 5xx are retryable; 404 and
    /// 422 are permanent.
    #[error("{message}")]
    RepoHost {
        message: String,
        status: Option<u16>,
        rate_limit_remaining: Option<u64>,
        rate_limit_reset: Option<u64>,
        retryable: bool,
    },

    /// Deduplication store failure. Surfaced to logs; never retried.
    #[error("{message}")]
    DedupStore {
        message: String,
        operation: &'static str,
    },

    /// Resource could not be located (no repo mapping, or no matching
    /// Terraform block). Permanent.
    #[error("{message}")]
    ResourceNotFound {
        message: String,
        resource_arn: Option<String>,
    },

    /// Invalid or missing configuration. Fatal at startup.
    #[error("{message}")]
    Config {
        message: String,
        key: Option<&'static str>,
    },

    /// Generated fix failed terraform fmt/validate. Permanent.
    #[error("{message}")]
    TerraformValidation {
        message: String,
        diagnostics: Vec<String>,
    },

    /// Rate limiter timed out waiting for a token. Retryable.
    #[error("{message}")]
    RateLimit { message: String },
}

impl Error {
    pub fn monitor_api(message: impl Into<String>, status: Option<u16>) -> Self {
        let retryable = status.is_none_or(|s| s == 429 || s >= 500);
        Error::MonitorApi { message: message.into(), status, retryable }
    }

    pub fn hcl_parse(message: impl Into<String>, file: Option<String>) -> Self {
        Error::HclParse { message: message.into(), file }
    }

    pub fn inference(message: impl Into<String>, code: Option<String>) -> Self {
        let retryable = match code.as_deref() {
            Some("ThrottlingException")
            | Some("ServiceUnavailableException")
            | Some("ModelTimeoutException")
            | Some("InternalServerException") => true,
            Some(_) => false,
            None => true,
        };
        Error::Inference { message: message.into(), code, retryable }
    }

    pub fn inference_permanent(message: impl Into<String>, code: Option<String>) -> Self {
        Error::Inference { message: message.into(), code, retryable: false }
    }

    pub fn repo_host(message: impl Into<String>, status: Option<u16>) -> Self {
        let retryable = status.is_none_or(|s| s == 429 || s >= 500);
        Error::RepoHost {
            message: message.into(),
            status,
            rate_limit_remaining: None,
            rate_limit_reset: None,
            retryable,
        }
    }

    pub fn dedup_store(message: impl Into<String>, operation: &'static str) -> Self {
        Error::DedupStore { message: message.into(), operation }
    }

    pub fn resource_not_found(
        message: impl Into<String>,
        resource_arn: Option<String>,
    ) -> Self {
        Error::ResourceNotFound { message: message.into(), resource_arn }
    }

    pub fn config(message: impl Into<String>, key: Option<&'static str>) -> Self {
        Error::Config { message: message.into(), key }
    }

    pub fn terraform_validation(
        message: impl Into<String>,
        diagnostics: Vec<String>,
    ) -> Self {
        Error::TerraformValidation { message: message.into(), diagnostics }
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Error::RateLimit { message: message.into() }
    }

    /// Whether the orchestrator should retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::MonitorApi { retryable, .. } => *retryable,
            Error::Inference { retryable, .. } => *retryable,
            Error::RepoHost { retryable, .. } => *retryable,
            Error::RateLimit { .. } => true,
            Error::HclParse { .. }
            | Error::DedupStore { .. }
            | Error::ResourceNotFound { .. }
            | Error::Config { .. }
            | Error::TerraformValidation { .. } => false,
        }
    }

    /// Stable kind label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MonitorApi { .. } => "monitor-api",
            Error::HclParse { .. } => "parse-hcl",
            Error::Inference { .. } => "inference",
            Error::RepoHost { .. } => "repo-host",
            Error::DedupStore { .. } => "dedup-store",
            Error::ResourceNotFound { .. } => "resource-not-found",
            Error::Config { .. } => "config",
            Error::TerraformValidation { .. } => "terraform-validation",
            Error::RateLimit { .. } => "rate-limit",
        }
    }

    /// Structured context pairs for log emission.
    pub fn context(&self) -> Vec<(&'static str, String)> {
        let mut ctx = vec![("kind", self.kind().to_string())];
        match self {
            Error::MonitorApi { status, .. } | Error::RepoHost { status, .. } => {
                if let Some(s) = status {
                    ctx.push(("status", s.to_string()));
                }
            }
            Error::Inference { code, .. } => {
                if let Some(c) = code {
                    ctx.push(("code", c.clone()));
                }
            }
            Error::DedupStore { operation, .. } => {
                ctx.push(("operation", operation.to_string()));
            }
            Error::ResourceNotFound { resource_arn, .. } => {
                if let Some(arn) = resource_arn {
                    ctx.push(("resource_arn", arn.clone()));
                }
            }
            Error::Config { key, .. } => {
                if let Some(k) = key {
                    ctx.push(("config_key", k.to_string()));
                }
            }
            _ => {}
        }
        if let Error::RepoHost { rate_limit_remaining, rate_limit_reset, .. } = self {
            if let Some(r) = rate_limit_remaining {
                ctx.push(("rate_limit_remaining", r.to_string()));
            }
            if let Some(r) = rate_limit_reset {
                ctx.push(("rate_limit_reset", r.to_string()));
            }
        }
        ctx
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    // ── retryability classification ──

    #[test]
    fn test_monitor_api_5xx_retryable() {
        assert!(Error::monitor_api("server error", Some(500)).is_retryable());
        assert!(Error::monitor_api("bad gateway", Some(502)).is_retryable());
    }

    #[test]
    fn test_monitor_api_429_retryable() {
        assert!(Error::monitor_api("rate limited", Some(429)).is_retryable());
    }

    #[test]
    fn test_monitor_api_4xx_permanent() {
        assert!(!Error::monitor_api("not found", Some(404)).is_retryable());
        assert!(!Error::monitor_api("forbidden", Some(403)).is_retryable());
    }

    #[test]
    fn test_monitor_api_network_retryable() {
        assert!(Error::monitor_api("connection reset", None).is_retryable());
    }

    #[test]
    fn test_inference_throttling_retryable() {
        let err = Error::inference("rate exceeded", Some("ThrottlingException".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_inference_timeout_retryable() {
        let err = Error::inference("timed out", Some("ModelTimeoutException".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_inference_validation_permanent() {
        let err = Error::inference("bad request", Some("ValidationException".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_inference_access_denied_permanent() {
        let err = Error::inference("no access", Some("AccessDeniedException".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_inference_no_code_retryable() {
        assert!(Error::inference("network error", None).is_retryable());
    }

    #[test]
    fn test_repo_host_classification() {
        assert!(Error::repo_host("rate limit", Some(429)).is_retryable());
        assert!(Error::repo_host("server error", Some(500)).is_retryable());
        assert!(!Error::repo_host("not found", Some(404)).is_retryable());
        assert!(!Error::repo_host("unprocessable", Some(422)).is_retryable());
    }

    #[test]
    fn test_permanent_kinds_never_retryable() {
        assert!(!Error::hcl_parse("bad syntax", None).is_retryable());
        assert!(!Error::dedup_store("down", "claim").is_retryable());
        assert!(!Error::resource_not_found("missing", None).is_retryable());
        assert!(!Error::config("missing key", None).is_retryable());
        assert!(!Error::terraform_validation("invalid", vec![]).is_retryable());
    }

    #[test]
    fn test_rate_limit_retryable() {
        assert!(Error::rate_limit("token timeout").is_retryable());
    }

    // ── kind labels ──

    #[test]
    fn test_kind_labels() {
        assert_eq!(Error::monitor_api("x", None).kind(), "monitor-api");
        assert_eq!(Error::hcl_parse("x", None).kind(), "parse-hcl");
        assert_eq!(Error::inference("x", None).kind(), "inference");
        assert_eq!(Error::repo_host("x", None).kind(), "repo-host");
        assert_eq!(Error::dedup_store("x", "op").kind(), "dedup-store");
        assert_eq!(Error::resource_not_found("x", None).kind(), "resource-not-found");
        assert_eq!(Error::config("x", None).kind(), "config");
        assert_eq!(Error::terraform_validation("x", vec![]).kind(), "terraform-validation");
    }

    // ── context ──

    #[test]
    fn test_context_includes_status() {
        let err = Error::repo_host("rate limited", Some(429));
        let ctx = err.context();
        assert!(ctx.contains(&("status", "429".to_string())));
        assert!(ctx.contains(&("kind", "repo-host".to_string())));
    }

    #[test]
    fn test_context_includes_rate_limit_headers() {
        let err = Error::RepoHost {
            message: "rate limited".into(),
            status: Some(429),
            rate_limit_remaining: Some(0),
            rate_limit_reset: Some(1700000000),
            retryable: true,
        };
        let ctx = err.context();
        assert!(ctx.contains(&("rate_limit_remaining", "0".to_string())));
        assert!(ctx.contains(&("rate_limit_reset", "1700000000".to_string())));
    }

    #[test]
    fn test_display_is_message() {
        let err = Error::resource_not_found("No repository mapping found", None);
        assert_eq!(err.to_string(), "No repository mapping found");
    }
}
