use std::collections::HashMap;

use crate::errors::{Error, Result};

/* ============================= AUTH ============================= */

/// Monitor API credentials: either a pre-issued token or an OAuth
/// client-credentials pair exchanged at client construction.
#[derive(Debug, Clone)]
pub enum MonitorAuth {
    Token(String),
    ClientCredentials { client_id: String, client_secret: String },
}

/* ============================= CONFIG ============================= */

const DEFAULT_MONITOR_BASE_URL: &str = "https://api.vanta.com";
const DEFAULT_MODEL_ID: &str = "anthropic.claude-sonnet-4-5-v2:0";

/// Validated service configuration, loaded from the environment at startup.
///
/// Missing required values are fatal (process exits 1). All variables use
/// the `TERRAFIX_` prefix.
#[derive(Debug, Clone)]
pub struct Config {
    pub monitor_auth: MonitorAuth,
    pub monitor_base_url: String,
    pub github_token: String,
    pub repo_mapping: HashMap<String, String>,
    pub terraform_path: String,
    pub clone_branch: String,
    pub inference_region: String,
    pub inference_model_id: String,
    pub inference_endpoint: Option<String>,
    pub redis_url: String,
    pub state_retention_days: u32,
    pub poll_interval_seconds: u64,
    pub max_workers: usize,
    pub log_level: String,
    pub log_json: bool,
    pub api_addr: String,
}

impl Config {
    /// Load and validate from process environment.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Load and validate from an explicit map. Split out from `from_env`
    /// so tests never mutate process environment.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let monitor_auth = match (
            get("TERRAFIX_MONITOR_TOKEN"),
            get("TERRAFIX_MONITOR_CLIENT_ID"),
            get("TERRAFIX_MONITOR_CLIENT_SECRET"),
        ) {
            (Some(token), _, _) => MonitorAuth::Token(token),
            (None, Some(client_id), Some(client_secret)) => {
                MonitorAuth::ClientCredentials { client_id, client_secret }
            }
            _ => {
                return Err(Error::config(
                    "TERRAFIX_MONITOR_TOKEN or TERRAFIX_MONITOR_CLIENT_ID + \
                     TERRAFIX_MONITOR_CLIENT_SECRET is required",
                    Some("TERRAFIX_MONITOR_TOKEN"),
                ));
            }
        };

        let github_token = get("TERRAFIX_GITHUB_TOKEN").ok_or_else(|| {
            Error::config("TERRAFIX_GITHUB_TOKEN is required but not set", Some("TERRAFIX_GITHUB_TOKEN"))
        })?;

        let inference_region = get("TERRAFIX_INFERENCE_REGION").ok_or_else(|| {
            Error::config(
                "TERRAFIX_INFERENCE_REGION is required but not set",
                Some("TERRAFIX_INFERENCE_REGION"),
            )
        })?;
        if inference_region.matches('-').count() < 2 {
            return Err(Error::config(
                format!("TERRAFIX_INFERENCE_REGION '{inference_region}' is not a valid region (expected e.g. us-west-2)"),
                Some("TERRAFIX_INFERENCE_REGION"),
            ));
        }

        let redis_url = get("TERRAFIX_REDIS_URL").ok_or_else(|| {
            Error::config("TERRAFIX_REDIS_URL is required but not set", Some("TERRAFIX_REDIS_URL"))
        })?;

        let repo_mapping = match get("TERRAFIX_REPO_MAPPING") {
            Some(raw) => parse_repo_mapping(&raw)?,
            None => HashMap::new(),
        };

        let state_retention_days =
            parse_number(vars, "TERRAFIX_STATE_RETENTION_DAYS", 7u32, 1, u32::MAX)?;
        let poll_interval_seconds =
            parse_number(vars, "TERRAFIX_POLL_INTERVAL_SECONDS", 300u64, 1, u64::MAX)?;
        let max_workers =
            parse_number(vars, "TERRAFIX_MAX_WORKERS", 3usize, 1, 10)?;

        let log_level = get("TERRAFIX_LOG_LEVEL").unwrap_or_else(|| "INFO".to_string());
        validate_log_level(&log_level)?;

        Ok(Config {
            monitor_auth,
            monitor_base_url: get("TERRAFIX_MONITOR_BASE_URL")
                .unwrap_or_else(|| DEFAULT_MONITOR_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            github_token,
            repo_mapping,
            terraform_path: get("TERRAFIX_TERRAFORM_PATH").unwrap_or_else(|| ".".to_string()),
            clone_branch: get("TERRAFIX_CLONE_BRANCH").unwrap_or_else(|| "main".to_string()),
            inference_region,
            inference_model_id: get("TERRAFIX_INFERENCE_MODEL_ID")
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            inference_endpoint: get("TERRAFIX_INFERENCE_ENDPOINT"),
            redis_url,
            state_retention_days,
            poll_interval_seconds,
            max_workers,
            log_level: log_level.to_ascii_uppercase(),
            log_json: get("TERRAFIX_LOG_JSON").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            api_addr: get("TERRAFIX_API_ADDR").unwrap_or_else(|| "0.0.0.0:8081".to_string()),
        })
    }

    /// Resolve the repository for a resource identifier.
    ///
    /// Lookup order: exact match, then longest matching prefix, then the
    /// `default` entry. Returns None when nothing applies — the
    /// orchestrator turns that into a permanent failure.
    pub fn repo_for_resource(&self, resource_arn: &str) -> Option<String> {
        if let Some(repo) = self.repo_mapping.get(resource_arn) {
            return Some(repo.clone());
        }

        let mut best: Option<(&str, &str)> = None;
        for (pattern, repo) in &self.repo_mapping {
            if pattern != "default"
                && resource_arn.starts_with(pattern.as_str())
                && best.is_none_or(|(p, _)| pattern.len() > p.len())
            {
                best = Some((pattern, repo));
            }
        }
        if let Some((_, repo)) = best {
            return Some(repo.to_string());
        }

        self.repo_mapping.get("default").filter(|r| !r.is_empty()).cloned()
    }
}

fn parse_repo_mapping(raw: &str) -> Result<HashMap<String, String>> {
    let parsed: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
        Error::config(
            format!("TERRAFIX_REPO_MAPPING is not valid JSON: {e}"),
            Some("TERRAFIX_REPO_MAPPING"),
        )
    })?;
    let object = parsed.as_object().ok_or_else(|| {
        Error::config("TERRAFIX_REPO_MAPPING must be a JSON object", Some("TERRAFIX_REPO_MAPPING"))
    })?;

    let mut mapping = HashMap::new();
    for (pattern, repo) in object {
        let repo = repo.as_str().ok_or_else(|| {
            Error::config(
                format!("TERRAFIX_REPO_MAPPING value for '{pattern}' must be a string"),
                Some("TERRAFIX_REPO_MAPPING"),
            )
        })?;
        mapping.insert(pattern.clone(), repo.to_string());
    }
    Ok(mapping)
}

fn parse_number<T>(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: T,
    min: T,
    max: T,
) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Copy + std::fmt::Display,
{
    let Some(raw) = vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    let value: T = raw
        .parse()
        .map_err(|_| Error::config(format!("{key} '{raw}' is not a valid number"), Some(key)))?;
    if value < min || value > max {
        return Err(Error::config(
            format!("{key} must be between {min} and {max}, got {value}"),
            Some(key),
        ));
    }
    Ok(value)
}

fn validate_log_level(level: &str) -> Result<()> {
    const VALID: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];
    if VALID.contains(&level.to_ascii_uppercase().as_str()) {
        Ok(())
    } else {
        Err(Error::config(
            format!("TERRAFIX_LOG_LEVEL '{level}' is not one of DEBUG, INFO, WARNING, ERROR, CRITICAL"),
            Some("TERRAFIX_LOG_LEVEL"),
        ))
    }
}
