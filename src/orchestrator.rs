use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Instrument, error, info, info_span, warn};

use crate::analyzer::Analyzer;
use crate::config::Config;
use crate::dedup::DedupStore;
use crate::errors::{Error, Result};
use crate::generator::RemediationGenerator;
use crate::git::SecureGitClient;
use crate::logging;
use crate::metrics::{self, COLLECTOR, Stage};
use crate::monitor::{Violation, fingerprint};
use crate::pr::PrCreator;
use crate::validator::Validator;

/* ============================= RETRY POLICY ============================= */

const MAX_ATTEMPTS: u32 = 3;
const MAX_BACKOFF_SECONDS: u64 = 60;

/// Exponential backoff after the nth failed attempt (1-based), capped.
pub fn backoff_seconds(attempt: u32) -> u64 {
    (2u64.saturating_mul(1u64 << attempt.min(32))).min(MAX_BACKOFF_SECONDS)
}

/// Run attempts until one succeeds, a permanent error surfaces, or the
/// attempt budget is exhausted. Only errors flagged retryable are retried.
pub async fn run_with_retry<F, Fut>(mut attempt: F) -> Result<String>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut last_error: Option<Error> = None;

    for n in 1..=MAX_ATTEMPTS {
        match attempt(n).await {
            Ok(url) => return Ok(url),
            Err(e) if e.is_retryable() && n < MAX_ATTEMPTS => {
                let backoff = backoff_seconds(n);
                warn!(
                    attempt = n,
                    max_attempts = MAX_ATTEMPTS,
                    backoff_seconds = backoff,
                    error = %e,
                    "transient_error_retrying"
                );
                COLLECTOR.increment(metrics::RETRIES_TOTAL, &[]);
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                last_error = Some(e);
            }
            Err(e) => {
                if !e.is_retryable() {
                    error!(error = %e, kind = e.kind(), "permanent_error_not_retrying");
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::monitor_api("retry budget exhausted", None)))
}

/* ============================= DEPS & OUTCOME ============================= */

/// Everything one pipeline run needs. Shared across the worker pool.
pub struct PipelineDeps {
    pub config: Arc<Config>,
    pub store: DedupStore,
    pub git: SecureGitClient,
    pub generator: RemediationGenerator,
    pub pr: PrCreator,
    /// None when the Terraform CLI is unavailable; validation degrades to
    /// a warning and the raw fix is used.
    pub validator: Option<Validator>,
}

/// Result of processing one violation.
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub success: bool,
    pub fingerprint: String,
    pub pr_url: Option<String>,
    pub error: Option<String>,
    pub skipped: bool,
}

impl ProcessingOutcome {
    fn skipped(fingerprint: String) -> Self {
        ProcessingOutcome { success: true, fingerprint, pr_url: None, error: None, skipped: true }
    }

    fn succeeded(fingerprint: String, pr_url: String) -> Self {
        ProcessingOutcome {
            success: true,
            fingerprint,
            pr_url: Some(pr_url),
            error: None,
            skipped: false,
        }
    }

    fn failed(fingerprint: String, error: String) -> Self {
        ProcessingOutcome {
            success: false,
            fingerprint,
            pr_url: None,
            error: Some(error),
            skipped: false,
        }
    }
}

/* ============================= PIPELINE ============================= */

/// Process a single violation end to end: dedup, clone, analyze, generate,
/// validate, open PR, record.
pub async fn process_violation(violation: &Violation, deps: &PipelineDeps) -> ProcessingOutcome {
    let correlation_id = logging::correlation_id();
    let span = info_span!(
        "pipeline",
        correlation_id = %correlation_id,
        test_id = %violation.test_id,
    );

    process_violation_inner(violation, deps).instrument(span).await
}

async fn process_violation_inner(
    violation: &Violation,
    deps: &PipelineDeps,
) -> ProcessingOutcome {
    let started = Instant::now();
    let fp = fingerprint(violation);

    info!(
        resource_arn = %violation.resource_arn,
        severity = violation.severity.as_str(),
        fingerprint = %&fp[..16],
        "processing_violation"
    );

    match claim_fingerprint(&fp, deps).await {
        Ok(true) => {}
        Ok(false) => {
            info!(fingerprint = %&fp[..16], "violation_already_processed_skipping");
            return ProcessingOutcome::skipped(fp);
        }
        Err(e) => {
            // Store trouble must not block remediation; fall through.
            error!(error = %e, "dedup_claim_failed_continuing");
        }
    }

    if let Err(e) = deps
        .store
        .mark_in_progress(&fp, &violation.test_id, &violation.resource_arn)
        .await
    {
        error!(error = %e, "mark_in_progress_failed_continuing");
    }

    let result = run_with_retry(|_| attempt_once(violation, deps)).await;
    metrics::record_stage(Stage::TotalProcessing, started.elapsed());

    match result {
        Ok(pr_url) => {
            if let Err(e) = deps.store.mark_processed(&fp, &pr_url).await {
                error!(error = %e, "mark_processed_failed");
            }
            COLLECTOR.increment(metrics::PRS_CREATED_TOTAL, &[]);
            metrics::PRS_CREATED.inc();
            info!(pr_url = %pr_url, "violation_processed");
            ProcessingOutcome::succeeded(fp, pr_url)
        }
        Err(e) => {
            let message = e.to_string();
            error!(error = %message, kind = e.kind(), "violation_processing_failed");
            COLLECTOR.increment(metrics::API_ERRORS_TOTAL, &[("kind", e.kind())]);
            if let Err(store_err) = deps.store.mark_failed(&fp, &message).await {
                // A failed status write is logged and swallowed so other
                // violations keep flowing.
                warn!(error = %store_err, "mark_failed_write_failed");
            }
            ProcessingOutcome::failed(fp, message)
        }
    }
}

/// Atomically claim ownership of a fingerprint.
///
/// The SET NX claim is the only race-free admission primitive: for any
/// fingerprint at most one worker wins. A lost claim against a *failed*
/// record is retaken by deleting the terminal record and claiming again —
/// failed violations are re-claimable on the next cycle, while in-progress
/// and completed records stay sticky until TTL.
async fn claim_fingerprint(fp: &str, deps: &PipelineDeps) -> Result<bool> {
    if deps.store.claim(fp).await? {
        return Ok(true);
    }

    match deps.store.status(fp).await? {
        Some(crate::dedup::PipelineStatus::Failed) => {
            deps.store.delete(fp).await?;
            deps.store.claim(fp).await
        }
        _ => Ok(false),
    }
}

/// One pipeline attempt. Every permanent condition maps to a non-retryable
/// error so `run_with_retry` surfaces it immediately.
async fn attempt_once(violation: &Violation, deps: &PipelineDeps) -> Result<String> {
    let repo = deps.config.repo_for_resource(&violation.resource_arn).ok_or_else(|| {
        Error::resource_not_found(
            format!("No repository mapping found for {}", violation.resource_arn),
            Some(violation.resource_arn.clone()),
        )
    })?;

    info!(repo = %repo, "resource_mapped_to_repository");

    // The clone lives inside this scope; the directory is removed on every
    // exit path when `workdir` drops.
    let workdir = tempfile::Builder::new()
        .prefix("terrafix_work_")
        .tempdir()
        .map_err(|e| Error::repo_host(format!("failed to create work directory: {e}"), None))?;
    let repo_path = workdir.path().join("repo");

    let clone_started = Instant::now();
    deps.git
        .clone_repository(&repo, &repo_path, &deps.config.clone_branch, 1)
        .await?;
    metrics::record_stage(Stage::CloneRepo, clone_started.elapsed());

    let terraform_path = repo_path.join(&deps.config.terraform_path);
    if !terraform_path.exists() {
        return Err(Error::resource_not_found(
            format!(
                "Terraform path {} not found in repository {repo}",
                deps.config.terraform_path
            ),
            Some(violation.resource_arn.clone()),
        ));
    }

    let parse_started = Instant::now();
    let analyzer = Analyzer::load(&terraform_path);
    let located = analyzer.find_by_resource(&violation.resource_arn, &violation.resource_type);
    metrics::record_stage(Stage::ParseTerraform, parse_started.elapsed());

    let located = located.ok_or_else(|| {
        Error::resource_not_found(
            format!(
                "Resource {} not found in Terraform ({} files searched)",
                violation.resource_arn,
                analyzer.parsed_count()
            ),
            Some(violation.resource_arn.clone()),
        )
    })?;

    let module_context = analyzer.module_context(&located.file);
    let current_config = analyzer.file_content(&located.file)?.to_string();

    let inference_started = Instant::now();
    let fix = deps
        .generator
        .generate_fix(violation, &current_config, &located.block_text, &module_context)
        .await?;
    metrics::record_stage(Stage::Inference, inference_started.elapsed());

    if fix.fixed_config.trim().is_empty() {
        return Err(Error::inference_permanent("Generated fix is empty", None));
    }

    let validate_started = Instant::now();
    let final_config = match &deps.validator {
        Some(validator) => {
            let filename = located
                .file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "main.tf".to_string());
            let result = validator
                .validate(&fix.fixed_config, &filename, Some(&terraform_path))
                .await?;
            for warning in &result.warnings {
                warn!(warning = %warning, "terraform_validation_warning");
            }
            if !result.is_valid {
                // The model call may have been retryable, but an invalid
                // artifact is final.
                return Err(Error::terraform_validation(
                    format!(
                        "Generated fix is invalid: {}",
                        result.error_message.unwrap_or_else(|| "validation failed".into())
                    ),
                    vec![],
                ));
            }
            result.formatted_content.unwrap_or(fix.fixed_config.clone())
        }
        None => {
            warn!("terraform_cli_unavailable_skipping_validation");
            fix.fixed_config.clone()
        }
    };
    metrics::record_stage(Stage::ValidateFix, validate_started.elapsed());

    let relative_path = located
        .file
        .strip_prefix(&repo_path)
        .map(|p| p.to_string_lossy().to_string())
        .map_err(|_| Error::hcl_parse("located file escapes repository root", None))?;

    let pr_started = Instant::now();
    let pr_url = deps
        .pr
        .create_remediation_pr(
            &repo,
            &relative_path,
            &final_config,
            violation,
            &fix,
            &deps.config.clone_branch,
        )
        .await?;
    metrics::record_stage(Stage::CreatePr, pr_started.elapsed());

    if pr_url.is_empty() {
        // Duplicate-branch sentinel: another worker won the race.
        return Err(Error::repo_host("Failed to create PR (duplicate branch)", Some(422)));
    }

    Ok(pr_url)
}
