use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::analyzer::ModuleContext;
use crate::errors::{Error, Result};
use crate::monitor::Violation;
use crate::rate_limit::INFERENCE_LIMITER;

/* ============================= FIX ============================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// Structured output of the inference call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationFix {
    pub fixed_config: String,
    pub explanation: String,
    #[serde(default)]
    pub changed_attributes: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub breaking_changes: String,
    #[serde(default)]
    pub additional_requirements: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/* ============================= GENERATOR ============================= */

const MAX_TOKENS: u32 = 4096;
const TEMPERATURE: f64 = 0.1;
const TOP_P: f64 = 0.9;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const LIMITER_TIMEOUT: Duration = Duration::from_secs(60);

/// Generates compliant Terraform configurations through the inference
/// endpoint.
pub struct RemediationGenerator {
    http: reqwest::Client,
    endpoint: String,
    model_id: String,
}

impl RemediationGenerator {
    /// `endpoint_override` replaces the regional inference URL, used by
    /// tests and mock deployments.
    pub fn new(region: &str, model_id: &str, endpoint_override: Option<&str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::inference_permanent(format!("failed to build HTTP client: {e}"), None))?;

        let endpoint = match endpoint_override {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-runtime.{region}.amazonaws.com"),
        };

        info!(model_id, endpoint = %endpoint, "remediation_generator_initialized");

        Ok(RemediationGenerator { http, endpoint, model_id: model_id.to_string() })
    }

    /// Produce a fix for a located resource.
    pub async fn generate_fix(
        &self,
        violation: &Violation,
        current_config: &str,
        resource_block: &str,
        module_context: &ModuleContext,
    ) -> Result<RemediationFix> {
        INFERENCE_LIMITER.acquire(LIMITER_TIMEOUT).await?;

        let prompt = build_prompt(violation, current_config, resource_block, module_context);
        let body = serde_json::json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": TEMPERATURE,
            "top_p": TOP_P,
        });

        debug!(model_id = %self.model_id, test_id = %violation.test_id, "invoking_inference");

        let url = format!("{}/model/{}/invoke", self.endpoint, self.model_id);
        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::inference(format!("inference request timed out: {e}"), Some("ModelTimeoutException".into()))
                } else {
                    Error::inference(format!("inference network error: {e}"), None)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let payload: Value = response.json().await.unwrap_or(Value::Null);
            let code = error_code(&payload, status.as_u16());
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("inference request failed")
                .to_string();
            return Err(Error::inference(
                format!("inference failed with {status}: {message}"),
                Some(code),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            Error::inference(format!("inference response invalid JSON: {e}"), None)
        })?;

        let text = payload
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::inference_permanent("empty inference response", None))?;

        let fix = parse_fix(text)?;
        info!(
            test_id = %violation.test_id,
            confidence = fix.confidence.as_str(),
            changed = fix.changed_attributes.len(),
            "fix_generated"
        );
        Ok(fix)
    }
}

/// Map an HTTP failure to the provider's error-code vocabulary when the
/// body does not carry one.
fn error_code(payload: &Value, status: u16) -> String {
    if let Some(code) = payload.pointer("/__type").and_then(Value::as_str) {
        return code.rsplit('#').next().unwrap_or(code).to_string();
    }
    match status {
        429 => "ThrottlingException".to_string(),
        403 => "AccessDeniedException".to_string(),
        400 => "ValidationException".to_string(),
        404 => "ResourceNotFoundException".to_string(),
        s if s >= 500 => "ServiceUnavailableException".to_string(),
        s => format!("Http{s}"),
    }
}

/* ============================= PROMPT ============================= */

/// Tag-structured prompt with the failure summary, the file as it stands,
/// the located block, module context, and a strict output schema.
pub fn build_prompt(
    violation: &Violation,
    current_config: &str,
    resource_block: &str,
    module_context: &ModuleContext,
) -> String {
    let current_state =
        serde_json::to_string_pretty(&violation.current_state).unwrap_or_default();
    let required_state =
        serde_json::to_string_pretty(&violation.required_state).unwrap_or_default();
    let context = if module_context.is_empty() {
        "none".to_string()
    } else {
        module_context.render()
    };

    format!(
        r#"You are a senior infrastructure engineer remediating a compliance failure in Terraform.

<compliance_failure>
Test: {test_name}
Framework: {framework}
Severity: {severity}
Resource: {resource_arn}
Resource type: {resource_type}
Reason: {failure_reason}
Current state: {current_state}
Required state: {required_state}
</compliance_failure>

<current_configuration>
{current_config}
</current_configuration>

<resource_block>
{resource_block}
</resource_block>

<module_context>
{context}
</module_context>

TASK:
1. Modify the configuration so the resource satisfies the required state.
2. Change only what the compliance failure requires.
3. Return the complete replacement file contents.

RESPONSE FORMAT (JSON only):
{{
  "fixed_config": "complete replacement file contents",
  "explanation": "what changed and why it satisfies the control",
  "changed_attributes": ["attribute", "names"],
  "reasoning": "step-by-step logic",
  "confidence": "high|medium|low",
  "breaking_changes": "none, or what could break",
  "additional_requirements": "none, or manual follow-ups required"
}}

CRITICAL CONSTRAINTS:
- Modify this file only; never invent new files.
- Preserve resource names, identifiers, tags, and unrelated attributes.
- Keep the diff minimal.

Generate the JSON response now:"#,
        test_name = violation.test_name,
        framework = violation.framework,
        severity = violation.severity.as_str(),
        resource_arn = violation.resource_arn,
        resource_type = violation.resource_type,
        failure_reason = violation.failure_reason,
    )
}

/* ============================= RESPONSE PARSING ============================= */

/// Parse the model's text payload into a fix.
///
/// The payload may be plain JSON or wrapped in a fenced code block; the
/// fence is stripped first. Missing required fields are a permanent error.
pub fn parse_fix(text: &str) -> Result<RemediationFix> {
    let json_str = strip_fence(text);

    let value: Value = serde_json::from_str(json_str).map_err(|e| {
        Error::inference_permanent(format!("inference response is not valid JSON: {e}"), None)
    })?;

    for field in ["fixed_config", "explanation", "confidence"] {
        if value.get(field).is_none() {
            return Err(Error::inference_permanent(
                format!("inference response missing required field '{field}'"),
                None,
            ));
        }
    }

    serde_json::from_value(value).map_err(|e| {
        Error::inference_permanent(format!("inference response malformed: {e}"), None)
    })
}

fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
        return rest.trim();
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
        return rest.trim();
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Severity;

    fn violation() -> Violation {
        Violation {
            test_id: "s3-bpa-01".into(),
            test_name: "S3 Bucket Block Public Access".into(),
            resource_arn: "arn:aws:s3:::demo".into(),
            resource_type: "AWS::S3::Bucket".into(),
            failure_reason: "public access not blocked".into(),
            severity: Severity::High,
            framework: "SOC2".into(),
            failed_at: "2026-03-01T10:30:00Z".into(),
            current_state: serde_json::from_value(
                serde_json::json!({"block_public_acls": false}),
            )
            .unwrap(),
            required_state: serde_json::from_value(
                serde_json::json!({"block_public_acls": true}),
            )
            .unwrap(),
            resource_id: None,
            resource_details: Map::new(),
            extra: Map::new(),
        }
    }

    fn fix_json() -> String {
        serde_json::json!({
            "fixed_config": "resource \"aws_s3_bucket\" \"demo\" {}",
            "explanation": "Enabled block public access",
            "changed_attributes": ["block_public_acls"],
            "reasoning": "The control requires all four settings",
            "confidence": "high",
            "breaking_changes": "none",
            "additional_requirements": "none",
        })
        .to_string()
    }

    // ── prompt ──

    #[test]
    fn test_prompt_contains_failure_details() {
        let prompt = build_prompt(&violation(), "file contents", "block", &ModuleContext::default());
        assert!(prompt.contains("S3 Bucket Block Public Access"));
        assert!(prompt.contains("arn:aws:s3:::demo"));
        assert!(prompt.contains("<compliance_failure>"));
        assert!(prompt.contains("<current_configuration>"));
        assert!(prompt.contains("file contents"));
        assert!(prompt.contains("block_public_acls"));
    }

    #[test]
    fn test_prompt_empty_module_context() {
        let prompt = build_prompt(&violation(), "c", "b", &ModuleContext::default());
        assert!(prompt.contains("<module_context>\nnone\n</module_context>"));
    }

    #[test]
    fn test_prompt_renders_module_context() {
        let context = ModuleContext {
            providers: vec!["aws".into()],
            variables: vec![],
            outputs: vec![],
            modules: vec![],
        };
        let prompt = build_prompt(&violation(), "c", "b", &context);
        assert!(prompt.contains("providers: aws"));
    }

    // ── response parsing ──

    #[test]
    fn test_parse_plain_json() {
        let fix = parse_fix(&fix_json()).unwrap();
        assert_eq!(fix.confidence, Confidence::High);
        assert_eq!(fix.changed_attributes, vec!["block_public_acls"]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let wrapped = format!("```json\n{}\n```", fix_json());
        let fix = parse_fix(&wrapped).unwrap();
        assert_eq!(fix.confidence, Confidence::High);
    }

    #[test]
    fn test_parse_bare_fence() {
        let wrapped = format!("```\n{}\n```", fix_json());
        assert!(parse_fix(&wrapped).is_ok());
    }

    #[test]
    fn test_parse_missing_fixed_config_is_permanent() {
        let err = parse_fix(r#"{"explanation": "x", "confidence": "low"}"#).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("fixed_config"));
    }

    #[test]
    fn test_parse_missing_confidence_is_permanent() {
        let err = parse_fix(r#"{"fixed_config": "x", "explanation": "y"}"#).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_invalid_json_is_permanent() {
        let err = parse_fix("this is not json").unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "inference");
    }

    #[test]
    fn test_parse_preserves_unknown_fields() {
        let mut raw: Value = serde_json::from_str(&fix_json()).unwrap();
        raw["estimated_impact"] = Value::String("low blast radius".into());
        let fix = parse_fix(&raw.to_string()).unwrap();
        assert_eq!(fix.extra["estimated_impact"], "low blast radius");
    }

    #[test]
    fn test_parse_defaults_optional_fields() {
        let minimal = r#"{"fixed_config": "x", "explanation": "y", "confidence": "medium"}"#;
        let fix = parse_fix(minimal).unwrap();
        assert!(fix.changed_attributes.is_empty());
        assert_eq!(fix.reasoning, "");
    }

    // ── error code mapping ──

    #[test]
    fn test_error_code_from_type_field() {
        let payload = serde_json::json!({"__type": "com.amazon#ThrottlingException"});
        assert_eq!(error_code(&payload, 429), "ThrottlingException");
    }

    #[test]
    fn test_error_code_from_status() {
        assert_eq!(error_code(&Value::Null, 429), "ThrottlingException");
        assert_eq!(error_code(&Value::Null, 403), "AccessDeniedException");
        assert_eq!(error_code(&Value::Null, 400), "ValidationException");
        assert_eq!(error_code(&Value::Null, 503), "ServiceUnavailableException");
    }

    #[test]
    fn test_confidence_labels() {
        assert_eq!(Confidence::High.as_str(), "high");
        assert_eq!(Confidence::Medium.as_str(), "medium");
        assert_eq!(Confidence::Low.as_str(), "low");
    }
}
