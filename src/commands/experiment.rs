use std::path::Path;

use anyhow::{Context, Result};

use terrafix::experiments::charts;
use terrafix::experiments::profiles::{self, ProfileConfig, WorkloadProfile};
use terrafix::experiments::reporter::{ExperimentResult, Reporter, comparison_report};
use terrafix::experiments::runner::ExperimentRunner;
use terrafix::logging;

use crate::cli::{ExperimentKind, ExperimentOpts};

pub async fn run(kind: ExperimentKind) -> Result<()> {
    logging::init("INFO", false);

    match kind {
        ExperimentKind::Throughput { opts } => {
            let config = build_config(&opts)?;
            let mut runner = ExperimentRunner::new(opts.seed, 0.0);
            let result = runner.run_throughput(&config).await;
            finish_single(&result, &opts)
        }
        ExperimentKind::Resilience { opts, failure_rate } => {
            anyhow::ensure!(
                (0.0..=1.0).contains(&failure_rate),
                "--failure-rate must be between 0.0 and 1.0"
            );
            let config = build_config(&opts)?;
            let mut runner = ExperimentRunner::new(opts.seed, failure_rate);
            let result = runner.run_resilience(&config).await;
            finish_single(&result, &opts)
        }
        ExperimentKind::Scalability { opts, repo_sizes } => {
            let config = build_config(&opts)?;
            let sizes: Vec<&str> = repo_sizes.iter().map(String::as_str).collect();
            let mut runner = ExperimentRunner::new(opts.seed, 0.0);
            let results = runner.run_scalability(&sizes, &config).await;

            println!("{}", comparison_report(&results));
            if let Some(path) = opts.json_path() {
                let json = serde_json::to_string_pretty(&results)
                    .context("Failed to serialize results")?;
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            if let Some(dir) = opts.charts_dir() {
                write_comparison_charts(dir, &results)?;
            }
            Ok(())
        }
    }
}

/// Resolve the profile argument: a preset name, or a bare workload shape
/// on top of baseline defaults. CLI overrides win over either.
fn build_config(opts: &ExperimentOpts) -> Result<ProfileConfig> {
    let mut config = match profiles::preset(&opts.profile) {
        Some(config) => config,
        None => {
            let profile = match opts.profile.as_str() {
                "steady" => WorkloadProfile::Steady,
                "burst" => WorkloadProfile::Burst,
                "cascade" => WorkloadProfile::Cascade,
                other => anyhow::bail!(
                    "unknown profile '{other}' (expected steady, burst, cascade, or a preset name)"
                ),
            };
            ProfileConfig { profile, ..ProfileConfig::default() }
        }
    };

    if let Some(duration) = opts.duration {
        config.duration_seconds = duration;
    }
    if let Some(rate) = opts.rate {
        config.failures_per_interval = rate;
    }
    if let Some(interval) = opts.interval {
        anyhow::ensure!(interval >= 1, "--interval must be at least 1 second");
        config.interval_seconds = interval;
    }

    Ok(config)
}

fn finish_single(result: &ExperimentResult, opts: &ExperimentOpts) -> Result<()> {
    let reporter = Reporter::new(result);
    println!("{}", reporter.summary());

    if let Some(path) = opts.json_path() {
        reporter.export_json(path)?;
        println!("JSON report written to {}", path.display());
    }
    if let Some(path) = opts.csv_path() {
        reporter.export_csv(path)?;
        println!("CSV report written to {}", path.display());
    }
    if let Some(dir) = opts.charts_dir() {
        write_result_charts(dir, result)?;
        println!("Charts written to {}", dir.display());
    }

    Ok(())
}

fn write_result_charts(dir: &Path, result: &ExperimentResult) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let rendered = charts::charts_for_result(result);
    for (title, svg) in &rendered {
        let slug: String = title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        std::fs::write(dir.join(format!("{slug}.svg")), svg)?;
    }

    let rollup = charts::html_rollup(
        &format!("TerraFix {} experiment", result.experiment_type),
        &rendered,
    );
    std::fs::write(dir.join("report.html"), rollup)?;
    Ok(())
}

fn write_comparison_charts(dir: &Path, results: &[ExperimentResult]) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let rendered = vec![(
        "Throughput by repository size".to_string(),
        charts::comparison_bars(results),
    )];
    std::fs::write(dir.join("comparison.svg"), &rendered[0].1)?;
    std::fs::write(
        dir.join("report.html"),
        charts::html_rollup("TerraFix scalability experiment", &rendered),
    )?;
    Ok(())
}
