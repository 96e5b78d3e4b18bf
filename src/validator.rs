use std::path::Path;
use std::process::Output;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::{Error, Result};

/* ============================= RESULT ============================= */

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub formatted_content: Option<String>,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn invalid(message: impl Into<String>) -> Self {
        ValidationResult {
            is_valid: false,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/* ============================= TIMEOUTS ============================= */

const VERSION_TIMEOUT: Duration = Duration::from_secs(30);
const FMT_TIMEOUT: Duration = Duration::from_secs(60);
const INIT_TIMEOUT: Duration = Duration::from_secs(300);
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider-pinning files copied alongside the candidate so init/validate
/// see the repository's provider constraints.
const PROVIDER_CONTEXT_FILES: &[&str] = &[
    "versions.tf",
    "providers.tf",
    "terraform.tf",
    "variables.tf",
    ".terraform.lock.hcl",
];

/* ============================= VALIDATOR ============================= */

/// Drives the external Terraform CLI: format, init, validate.
///
/// Init failure degrades to a warning since provider credentials are often
/// absent at build time; the formatted content is still returned. Validate
/// failure is fatal for the candidate fix.
#[derive(Debug)]
pub struct Validator {
    terraform_path: String,
}

impl Validator {
    /// Verify the CLI is present and responsive before use.
    pub async fn new(terraform_path: &str) -> Result<Self> {
        let output = run_with_timeout(terraform_path, &["version"], None, VERSION_TIMEOUT)
            .await
            .map_err(|e| {
                Error::terraform_validation(
                    format!("terraform binary not available at '{terraform_path}': {e}"),
                    vec![],
                )
            })?;

        if !output.status.success() {
            return Err(Error::terraform_validation(
                format!(
                    "terraform version check failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                ),
                vec![],
            ));
        }

        let version_line = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        debug!(version = %version_line, "terraform_cli_verified");

        Ok(Validator { terraform_path: terraform_path.to_string() })
    }

    /// Validate a candidate configuration in an isolated working directory.
    pub async fn validate(
        &self,
        content: &str,
        filename: &str,
        provider_context_dir: Option<&Path>,
    ) -> Result<ValidationResult> {
        let workdir = tempfile::Builder::new()
            .prefix("terrafix_validate_")
            .tempdir()
            .map_err(|e| {
                Error::terraform_validation(format!("failed to create workdir: {e}"), vec![])
            })?;

        let config_file = workdir.path().join(filename);
        std::fs::write(&config_file, content).map_err(|e| {
            Error::terraform_validation(format!("failed to write candidate: {e}"), vec![])
        })?;

        if let Some(source) = provider_context_dir {
            copy_provider_files(source, workdir.path());
        }

        // Step 1: fmt
        let fmt = self.run_fmt(workdir.path(), &config_file).await;
        if !fmt.is_valid {
            return Ok(fmt);
        }

        // Step 2: init (non-fatal)
        let init = self.run_init(workdir.path()).await;
        if !init.is_valid {
            warn!(
                error = init.error_message.as_deref().unwrap_or("unknown"),
                "terraform_init_failed_skipping_validate"
            );
            return Ok(ValidationResult {
                is_valid: true,
                formatted_content: fmt.formatted_content,
                error_message: None,
                warnings: vec![format!(
                    "validate skipped: {}",
                    init.error_message.unwrap_or_else(|| "init failed".into())
                )],
            });
        }

        // Step 3: validate
        let validate = self.run_validate(workdir.path()).await;
        if !validate.is_valid {
            return Ok(validate);
        }

        Ok(ValidationResult {
            is_valid: true,
            formatted_content: fmt.formatted_content,
            error_message: None,
            warnings: validate.warnings,
        })
    }

    /// Format without validating. Returns the input unchanged on failure.
    pub async fn format_only(&self, content: &str) -> String {
        let Ok(workdir) = tempfile::Builder::new().prefix("terrafix_fmt_").tempdir() else {
            return content.to_string();
        };
        let config_file = workdir.path().join("main.tf");
        if std::fs::write(&config_file, content).is_err() {
            return content.to_string();
        }
        let result = self.run_fmt(workdir.path(), &config_file).await;
        match result.formatted_content {
            Some(formatted) if result.is_valid => formatted,
            _ => content.to_string(),
        }
    }

    async fn run_fmt(&self, workdir: &Path, config_file: &Path) -> ValidationResult {
        let file_arg = config_file.display().to_string();
        match run_with_timeout(
            &self.terraform_path,
            &["fmt", "-write=true", &file_arg],
            Some(workdir),
            FMT_TIMEOUT,
        )
        .await
        {
            Ok(output) if output.status.success() => {
                match std::fs::read_to_string(config_file) {
                    Ok(formatted) => ValidationResult {
                        is_valid: true,
                        formatted_content: Some(formatted),
                        ..Default::default()
                    },
                    Err(e) => ValidationResult::invalid(format!("failed to read formatted file: {e}")),
                }
            }
            Ok(output) => ValidationResult::invalid(format!(
                "terraform fmt failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )),
            Err(e) => ValidationResult::invalid(format!("terraform fmt: {e}")),
        }
    }

    async fn run_init(&self, workdir: &Path) -> ValidationResult {
        match run_with_timeout(
            &self.terraform_path,
            &["init", "-backend=false", "-input=false", "-no-color"],
            Some(workdir),
            INIT_TIMEOUT,
        )
        .await
        {
            Ok(output) if output.status.success() => {
                ValidationResult { is_valid: true, ..Default::default() }
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let excerpt: String = stderr.chars().take(200).collect();
                ValidationResult::invalid(format!("terraform init failed: {excerpt}"))
            }
            Err(e) => ValidationResult::invalid(format!("terraform init: {e}")),
        }
    }

    async fn run_validate(&self, workdir: &Path) -> ValidationResult {
        match run_with_timeout(
            &self.terraform_path,
            &["validate", "-json"],
            Some(workdir),
            VALIDATE_TIMEOUT,
        )
        .await
        {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                match serde_json::from_str::<Value>(&stdout) {
                    Ok(doc) => parse_validate_output(&doc),
                    Err(_) if output.status.success() => {
                        ValidationResult { is_valid: true, ..Default::default() }
                    }
                    Err(_) => ValidationResult::invalid(format!(
                        "terraform validate failed: {}",
                        String::from_utf8_lossy(&output.stderr)
                    )),
                }
            }
            Err(e) => ValidationResult::invalid(format!("terraform validate: {e}")),
        }
    }
}

/// Split the `validate -json` diagnostics document into warnings and
/// fatal errors.
fn parse_validate_output(doc: &Value) -> ValidationResult {
    let is_valid = doc.get("valid").and_then(Value::as_bool).unwrap_or(false);
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    if let Some(diagnostics) = doc.get("diagnostics").and_then(Value::as_array) {
        for diagnostic in diagnostics {
            let severity = diagnostic.get("severity").and_then(Value::as_str).unwrap_or("error");
            let summary = diagnostic
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            let detail = diagnostic.get("detail").and_then(Value::as_str).unwrap_or("");
            let message = if detail.is_empty() {
                summary.to_string()
            } else {
                format!("{summary}: {detail}")
            };
            if severity == "warning" {
                warnings.push(message);
            } else {
                errors.push(message);
            }
        }
    }

    if is_valid {
        ValidationResult { is_valid: true, warnings, ..Default::default() }
    } else {
        let message = if errors.is_empty() {
            "Validation failed".to_string()
        } else {
            errors.join("; ")
        };
        ValidationResult {
            is_valid: false,
            formatted_content: None,
            error_message: Some(message),
            warnings,
        }
    }
}

fn copy_provider_files(source: &Path, dest: &Path) {
    for filename in PROVIDER_CONTEXT_FILES {
        let source_file = source.join(filename);
        if source_file.exists() {
            if let Err(e) = std::fs::copy(&source_file, dest.join(filename)) {
                warn!(filename, error = %e, "failed_to_copy_provider_file");
            } else {
                debug!(filename, "copied_provider_file");
            }
        }
    }
}

async fn run_with_timeout(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> std::result::Result<Output, String> {
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("failed to run {program}: {e}")),
        Err(_) => Err(format!("{program} timed out after {}s", timeout.as_secs())),
    }
}
