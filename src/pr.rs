use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::errors::{Error, Result};
use crate::generator::{Confidence, RemediationFix};
use crate::monitor::{Severity, Violation};
use crate::rate_limit::REPO_HOST_LIMITER;

/* ============================= CONSTANTS ============================= */

const DEFAULT_API_BASE: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LIMITER_TIMEOUT: Duration = Duration::from_secs(60);
const STATE_JSON_LIMIT: usize = 2000;
const LABEL_COLOR: &str = "0366d6";

/* ============================= CREATOR ============================= */

/// Opens remediation pull requests against the repository host.
///
/// Branch creation is the race arbiter: when the branch already exists,
/// another worker won, and the empty PR-URL sentinel tells the caller the
/// duplicate was silently handled.
pub struct PrCreator {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl PrCreator {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base(token, DEFAULT_API_BASE)
    }

    /// Point at a different API host. Used by tests.
    pub fn with_base(token: &str, api_base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("terrafix/0.1.0")
            .build()
            .map_err(|e| Error::repo_host(format!("failed to build HTTP client: {e}"), None))?;
        Ok(PrCreator {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Create branch, commit, and pull request for one fix.
    ///
    /// Returns the PR URL, or the empty sentinel when the branch already
    /// existed. After the branch exists, any failure triggers best-effort
    /// branch deletion before the error propagates.
    pub async fn create_remediation_pr(
        &self,
        repo_full_name: &str,
        file_path: &str,
        new_content: &str,
        violation: &Violation,
        fix: &RemediationFix,
        base_branch: &str,
    ) -> Result<String> {
        info!(
            repo = repo_full_name,
            file_path,
            test_id = %violation.test_id,
            "creating_remediation_pr"
        );

        let base_sha = self.base_branch_sha(repo_full_name, base_branch).await?;

        let branch = branch_name(violation);
        match self.create_branch(repo_full_name, &branch, &base_sha).await {
            Ok(()) => {}
            Err(Error::RepoHost { status: Some(422), .. }) => {
                warn!(branch = %branch, "branch_already_exists_skipping_pr");
                return Ok(String::new());
            }
            Err(e) => return Err(e),
        }

        match self
            .commit_and_open_pr(repo_full_name, file_path, new_content, violation, fix, &branch, base_branch)
            .await
        {
            Ok(url) => Ok(url),
            Err(e) => {
                self.delete_branch(repo_full_name, &branch).await;
                Err(e)
            }
        }
    }

    async fn commit_and_open_pr(
        &self,
        repo: &str,
        file_path: &str,
        new_content: &str,
        violation: &Violation,
        fix: &RemediationFix,
        branch: &str,
        base_branch: &str,
    ) -> Result<String> {
        let blob_sha = self.file_blob_sha(repo, file_path, base_branch).await?;

        let commit_body = json!({
            "message": commit_message(violation),
            "content": BASE64.encode(new_content),
            "sha": blob_sha,
            "branch": branch,
        });
        self.request::<Value>(
            reqwest::Method::PUT,
            &format!("repos/{repo}/contents/{file_path}"),
            Some(&commit_body),
            "commit_file",
        )
        .await?;
        debug!(file_path, branch, "changes_committed");

        let pr_body = json!({
            "title": pr_title(violation),
            "body": pr_description(violation, fix, file_path),
            "head": branch,
            "base": base_branch,
        });
        let pr: Value = self
            .request(reqwest::Method::POST, &format!("repos/{repo}/pulls"), Some(&pr_body), "create_pr")
            .await?;

        let pr_url = pr
            .get("html_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let pr_number = pr.get("number").and_then(Value::as_u64).unwrap_or(0);

        self.apply_labels(repo, pr_number, &pr_labels(violation)).await;

        info!(pr_url = %pr_url, pr_number, "pull_request_created");
        Ok(pr_url)
    }

    async fn base_branch_sha(&self, repo: &str, base_branch: &str) -> Result<String> {
        let response: Value = self
            .request(
                reqwest::Method::GET,
                &format!("repos/{repo}/git/ref/heads/{base_branch}"),
                None,
                "get_base_ref",
            )
            .await
            .map_err(|e| match e {
                Error::RepoHost { status: Some(404), .. } => Error::RepoHost {
                    message: format!("repository {repo} or branch {base_branch} not found"),
                    status: Some(404),
                    rate_limit_remaining: None,
                    rate_limit_reset: None,
                    retryable: false,
                },
                other => other,
            })?;

        response
            .pointer("/object/sha")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::repo_host("base ref response missing sha", None))
    }

    async fn create_branch(&self, repo: &str, branch: &str, sha: &str) -> Result<()> {
        let body = json!({ "ref": format!("refs/heads/{branch}"), "sha": sha });
        self.request::<Value>(
            reqwest::Method::POST,
            &format!("repos/{repo}/git/refs"),
            Some(&body),
            "create_branch",
        )
        .await?;
        debug!(branch, sha, "branch_created");
        Ok(())
    }

    async fn file_blob_sha(&self, repo: &str, file_path: &str, base_branch: &str) -> Result<String> {
        let response: Value = self
            .request(
                reqwest::Method::GET,
                &format!("repos/{repo}/contents/{file_path}?ref={base_branch}"),
                None,
                "get_file",
            )
            .await?;
        response
            .get("sha")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::repo_host("contents response missing sha", None))
    }

    /// Apply labels, creating any that are missing. Failures are logged,
    /// never fatal.
    async fn apply_labels(&self, repo: &str, pr_number: u64, labels: &[String]) {
        for label in labels {
            let exists = self
                .request::<Value>(
                    reqwest::Method::GET,
                    &format!("repos/{repo}/labels/{label}"),
                    None,
                    "get_label",
                )
                .await
                .is_ok();
            if !exists {
                let body = json!({ "name": label, "color": LABEL_COLOR });
                if self
                    .request::<Value>(
                        reqwest::Method::POST,
                        &format!("repos/{repo}/labels"),
                        Some(&body),
                        "create_label",
                    )
                    .await
                    .is_err()
                {
                    debug!(label, "label_creation_failed");
                }
            }
        }

        let body = json!({ "labels": labels });
        if self
            .request::<Value>(
                reqwest::Method::POST,
                &format!("repos/{repo}/issues/{pr_number}/labels"),
                Some(&body),
                "add_labels",
            )
            .await
            .is_err()
        {
            warn!(pr_number, "failed_to_add_labels");
        }
    }

    /// Best-effort cleanup of a branch after a downstream failure.
    async fn delete_branch(&self, repo: &str, branch: &str) {
        if self
            .request::<Value>(
                reqwest::Method::DELETE,
                &format!("repos/{repo}/git/refs/heads/{branch}"),
                None,
                "delete_branch",
            )
            .await
            .is_err()
        {
            warn!(branch, "failed_to_delete_branch_after_error");
        } else {
            info!(branch, "cleaned_up_branch_after_error");
        }
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
        operation: &'static str,
    ) -> Result<T> {
        REPO_HOST_LIMITER.acquire(LIMITER_TIMEOUT).await?;

        let url = format!("{}/{}", self.api_base, path);
        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            Error::repo_host(format!("repo host network error during {operation}: {e}"), None)
        })?;

        let status = response.status();
        if !status.is_success() {
            let remaining = header_u64(&response, "x-ratelimit-remaining");
            let reset = header_u64(&response, "x-ratelimit-reset");
            let body_text = response.text().await.unwrap_or_default();
            let status = status.as_u16();
            return Err(Error::RepoHost {
                message: format!(
                    "repo host error during {operation} ({status}): {}",
                    body_text.chars().take(300).collect::<String>()
                ),
                status: Some(status),
                rate_limit_remaining: remaining,
                rate_limit_reset: reset,
                retryable: status == 429 || status >= 500,
            });
        }

        // DELETE returns 204 with no body
        if status.as_u16() == 204 {
            return serde_json::from_value(Value::Null).map_err(|e| {
                Error::repo_host(format!("unexpected empty response for {operation}: {e}"), None)
            });
        }

        response.json().await.map_err(|e| {
            Error::repo_host(format!("repo host returned invalid JSON during {operation}: {e}"), None)
        })
    }
}

fn header_u64(response: &reqwest::Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/* ============================= PR CONTENT ============================= */

/// Branch name: `terrafix/<slugified-test>-<8 hex of test id>`.
pub fn branch_name(violation: &Violation) -> String {
    let slug: String = violation
        .test_name
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '_' || c == '/' { '-' } else { c })
        .take(50)
        .collect();

    let digest = Sha256::digest(violation.test_id.as_bytes());
    let suffix: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    format!("terrafix/{slug}-{suffix}")
}

pub fn commit_message(violation: &Violation) -> String {
    format!(
        "fix(compliance): {}\n\n\
         Automated fix generated by TerraFix to address a compliance failure.\n\n\
         Test: {}\n\
         Framework: {}\n\
         Severity: {}\n\
         Resource: {}\n\n\
         This commit was automatically generated. Review carefully before merging.\n",
        violation.test_name,
        violation.test_name,
        violation.framework,
        violation.severity.as_str(),
        violation.resource_arn,
    )
}

pub fn severity_glyph(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "🔴",
        Severity::Medium => "🟡",
        Severity::Low => "🟢",
    }
}

pub fn pr_title(violation: &Violation) -> String {
    format!("{} [TerraFix] {}", severity_glyph(violation.severity), violation.test_name)
}

fn truncate_state_json(value: &serde_json::Map<String, Value>) -> String {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_default();
    if rendered.len() > STATE_JSON_LIMIT {
        let cut: String = rendered.chars().take(STATE_JSON_LIMIT).collect();
        format!("{cut}\n... [truncated]")
    } else {
        rendered
    }
}

fn confidence_guidance(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::High => "✅ This fix has high confidence. Review should be straightforward.",
        Confidence::Medium => "⚠️ This fix has medium confidence. Extra scrutiny recommended.",
        Confidence::Low => "❌ This fix has low confidence. Thorough review required.",
    }
}

/// Full markdown PR description with compliance details, change summary,
/// reviewer checklist, and truncated state JSON.
pub fn pr_description(violation: &Violation, fix: &RemediationFix, file_path: &str) -> String {
    let changed: String = if fix.changed_attributes.is_empty() {
        "(none listed)".to_string()
    } else {
        fix.changed_attributes
            .iter()
            .map(|a| format!("`{a}`"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"## 🤖 Automated Compliance Remediation

This PR was automatically generated by TerraFix to address a compliance failure.

### 📋 Compliance Failure Details

| Field | Value |
|-------|-------|
| **Test** | {test_name} |
| **Framework** | {framework} |
| **Severity** | {severity} |
| **Resource** | `{resource_arn}` |
| **Detected At** | {failed_at} |

**Failure Reason**: {failure_reason}

### 🔧 Changes Made

**Modified File**: `{file_path}`

**Changed Attributes**: {changed}

### 📝 Explanation

{explanation}

### 🧠 Reasoning

{reasoning}

### ⚠️ Review Checklist

Before merging this PR, please verify:

- [ ] The changes correctly address the compliance failure
- [ ] No breaking changes are introduced
- [ ] Resource names and identifiers are unchanged
- [ ] Existing tags and metadata are preserved
- [ ] The fix follows your team's Terraform conventions
- [ ] `terraform plan` shows expected changes only

### 🔄 Breaking Changes

{breaking_changes}

### 📌 Additional Requirements

{additional_requirements}

### 🤝 Review Confidence

AI Confidence: **{confidence}**

{guidance}

---

<details>
<summary>View Current vs Required State</summary>

**Current State**:
```json
{current_state}
```

**Required State**:
```json
{required_state}
```

</details>
"#,
        test_name = violation.test_name,
        framework = violation.framework,
        severity = violation.severity.as_str().to_uppercase(),
        resource_arn = violation.resource_arn,
        failed_at = violation.failed_at,
        failure_reason = violation.failure_reason,
        explanation = fix.explanation,
        reasoning = fix.reasoning,
        breaking_changes = fix.breaking_changes,
        additional_requirements = fix.additional_requirements,
        confidence = fix.confidence.as_str().to_uppercase(),
        guidance = confidence_guidance(fix.confidence),
        current_state = truncate_state_json(&violation.current_state),
        required_state = truncate_state_json(&violation.required_state),
    )
}

pub fn pr_labels(violation: &Violation) -> Vec<String> {
    vec![
        "compliance".to_string(),
        "automated".to_string(),
        "terrafix".to_string(),
        format!("severity:{}", violation.severity.as_str()),
        format!("framework:{}", violation.framework.to_lowercase()),
    ]
}
