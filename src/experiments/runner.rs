use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::errors::Error;
use crate::monitor::Violation;

use super::generator::SyntheticGenerator;
use super::injector::{FailureInjector, FailureMode};
use super::profiles::ProfileConfig;
use super::reporter::ExperimentResult;

/* ============================= RUNNER ============================= */

const MOCK_RETRY_ATTEMPTS: u32 = 3;
const MOCK_BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Drives throughput, resilience, and scalability experiments against a
/// mock pipeline, pacing generation with the workload profile and
/// consulting the failure injector at every external-call site.
pub struct ExperimentRunner {
    generator: SyntheticGenerator,
    injector: FailureInjector,
    mock_delay: Duration,
}

impl ExperimentRunner {
    pub fn new(seed: Option<u64>, failure_rate: f64) -> Self {
        ExperimentRunner {
            generator: SyntheticGenerator::new(seed),
            injector: FailureInjector::new(failure_rate, seed),
            mock_delay: Duration::from_millis(100),
        }
    }

    pub fn set_mock_delay(&mut self, delay: Duration) {
        self.mock_delay = delay;
    }

    /// Measure per-violation latency and aggregate rate under a profile.
    pub async fn run_throughput(&mut self, config: &ProfileConfig) -> ExperimentResult {
        let mut result =
            ExperimentResult::new("throughput", config.profile.as_str(), config.duration_seconds);
        result.metadata.insert("repo_size".to_string(), json!(config.repo_size));

        info!(
            profile = config.profile.as_str(),
            duration_seconds = config.duration_seconds,
            "throughput_experiment_started"
        );

        let started = Instant::now();
        self.run_stream(config, &mut result, false).await;
        result.finish(started.elapsed().as_secs_f64());

        info!(
            processed = result.total_processed,
            throughput = result.throughput_per_second(),
            "throughput_experiment_completed"
        );
        result
    }

    /// Inject failures at every call site and measure how much of the load
    /// survives through retries.
    pub async fn run_resilience(&mut self, config: &ProfileConfig) -> ExperimentResult {
        let mut result =
            ExperimentResult::new("resilience", config.profile.as_str(), config.duration_seconds);

        self.injector.reset_stats();
        self.injector.enable_all();

        info!(profile = config.profile.as_str(), "resilience_experiment_started");

        let started = Instant::now();
        let (retried, recovered) = self.run_stream(config, &mut result, true).await;
        result.finish(started.elapsed().as_secs_f64());

        self.injector.disable_all();
        result.metadata.insert("injector_stats".to_string(), self.injector.stats());
        result.metadata.insert("violations_retried".to_string(), json!(retried));
        result.metadata.insert("violations_recovered".to_string(), json!(recovered));
        let retry_success = if retried > 0 {
            recovered as f64 / retried as f64
        } else {
            0.0
        };
        result
            .metadata
            .insert("retry_success_fraction".to_string(), json!(retry_success));

        info!(
            processed = result.total_processed,
            failed = result.total_failed,
            retry_success_fraction = retry_success,
            "resilience_experiment_completed"
        );
        result
    }

    /// Iterate a base profile across repository-size labels.
    pub async fn run_scalability(
        &mut self,
        repo_sizes: &[&str],
        base: &ProfileConfig,
    ) -> Vec<ExperimentResult> {
        let mut results = Vec::with_capacity(repo_sizes.len());

        for size in repo_sizes {
            info!(repo_size = size, "scalability_experiment_started");
            let config = ProfileConfig { repo_size: size.to_string(), ..base.clone() };

            // Larger working copies cost proportionally more per violation.
            self.mock_delay = match *size {
                "small" => Duration::from_millis(50),
                "large" => Duration::from_millis(200),
                _ => Duration::from_millis(100),
            };

            let mut result = self.run_throughput(&config).await;
            result.experiment_type = "scalability".to_string();
            result.metadata.insert("repo_size".to_string(), json!(size));
            results.push(result);

            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        results
    }

    /// Generate and process every interval batch, pacing with the profile's
    /// interval. Returns (violations that hit a retryable error, violations
    /// that then recovered).
    async fn run_stream(
        &mut self,
        config: &ProfileConfig,
        result: &mut ExperimentResult,
        with_retries: bool,
    ) -> (u64, u64) {
        let interval = Duration::from_secs(config.interval_seconds.max(1));
        let batches = self.generator.batches(config);
        let mut retried = 0u64;
        let mut recovered = 0u64;

        for batch in batches {
            for violation in batch {
                result.record_generated();
                let attempt_start = Instant::now();

                let outcome = if with_retries {
                    self.mock_process_with_retries(&violation, result).await
                } else {
                    self.mock_process(&violation, result)
                        .await
                        .map(|_| 0u64)
                        .map_err(|e| (e, 0u64))
                };

                let latency_ms = attempt_start.elapsed().as_secs_f64() * 1000.0;
                match outcome {
                    Ok(retries) => {
                        result.record_processed(latency_ms);
                        if retries > 0 {
                            retried += 1;
                            recovered += 1;
                        }
                    }
                    Err((e, retries)) => {
                        result.record_failed(&e.to_string());
                        if retries > 0 {
                            retried += 1;
                        }
                        debug!(error = %e, "mock_processing_failed");
                    }
                }
            }
            tokio::time::sleep(interval).await;
        }

        (retried, recovered)
    }

    /// One pass through the mock pipeline, consulting the injector at each
    /// external-call site in pipeline order.
    async fn mock_process(
        &mut self,
        _violation: &Violation,
        result: &mut ExperimentResult,
    ) -> Result<(), Error> {
        self.injector.check(FailureMode::NetworkError)?;
        self.injector.check(FailureMode::DedupDisconnect)?;

        let clone_share = self.mock_delay / 4;
        tokio::time::sleep(clone_share).await;
        result.record_stage_timing("clone_repo", clone_share.as_secs_f64() * 1000.0);
        self.injector.check(FailureMode::CloneTimeout)?;

        let inference_share = self.mock_delay - clone_share;
        tokio::time::sleep(inference_share).await;
        result.record_stage_timing("inference", inference_share.as_secs_f64() * 1000.0);
        self.injector.check(FailureMode::InferenceThrottle)?;

        self.injector.check(FailureMode::RepoHostRateLimit)?;
        Ok(())
    }

    /// Mock processing with the orchestrator's retry shape, scaled down so
    /// experiments stay fast. Returns the retry count on success, or the
    /// final error plus retry count.
    async fn mock_process_with_retries(
        &mut self,
        violation: &Violation,
        result: &mut ExperimentResult,
    ) -> Result<u64, (Error, u64)> {
        let mut retries = 0u64;

        for attempt in 1..=MOCK_RETRY_ATTEMPTS {
            match self.mock_process(violation, result).await {
                Ok(()) => return Ok(retries),
                Err(e) if e.is_retryable() && attempt < MOCK_RETRY_ATTEMPTS => {
                    retries += 1;
                    tokio::time::sleep(MOCK_BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
                }
                Err(e) => return Err((e, retries)),
            }
        }

        unreachable!("retry loop always returns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiments::profiles::WorkloadProfile;

    fn quick_config() -> ProfileConfig {
        ProfileConfig {
            duration_seconds: 30,
            failures_per_interval: 2,
            interval_seconds: 10,
            ..ProfileConfig::default()
        }
    }

    // ── throughput ──

    #[tokio::test(start_paused = true)]
    async fn test_throughput_processes_everything_without_injection() {
        let mut runner = ExperimentRunner::new(Some(42), 0.0);
        runner.set_mock_delay(Duration::from_millis(10));
        let result = runner.run_throughput(&quick_config()).await;
        assert_eq!(result.total_generated, 6);
        assert_eq!(result.total_processed, 6);
        assert_eq!(result.total_failed, 0);
        assert_eq!(result.latencies_ms.len(), 6);
        assert!(result.throughput_per_second() > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_records_stage_timings() {
        let mut runner = ExperimentRunner::new(Some(42), 0.0);
        runner.set_mock_delay(Duration::from_millis(10));
        let result = runner.run_throughput(&quick_config()).await;
        assert!(result.stage_timings_ms.contains_key("clone_repo"));
        assert!(result.stage_timings_ms.contains_key("inference"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_cascade_generates_forty() {
        let mut runner = ExperimentRunner::new(Some(7), 0.0);
        runner.set_mock_delay(Duration::from_millis(1));
        let config = ProfileConfig {
            profile: WorkloadProfile::Cascade,
            duration_seconds: 60,
            failures_per_interval: 2,
            interval_seconds: 10,
            cascade_growth_rate: 1.5,
            ..ProfileConfig::default()
        };
        let result = runner.run_throughput(&config).await;
        assert_eq!(result.total_generated, 40);
    }

    // ── resilience ──

    #[tokio::test(start_paused = true)]
    async fn test_resilience_all_fail_at_rate_one() {
        let mut runner = ExperimentRunner::new(Some(1), 1.0);
        runner.set_mock_delay(Duration::from_millis(1));
        let result = runner.run_resilience(&quick_config()).await;
        assert_eq!(result.total_processed, 0);
        assert_eq!(result.total_failed, result.total_generated);
        assert!(result.metadata["injector_stats"]["total_injections"].as_u64().unwrap() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resilience_all_pass_at_rate_zero() {
        let mut runner = ExperimentRunner::new(Some(1), 0.0);
        runner.set_mock_delay(Duration::from_millis(1));
        let result = runner.run_resilience(&quick_config()).await;
        assert_eq!(result.total_failed, 0);
        assert_eq!(result.metadata["retry_success_fraction"], 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resilience_partial_rate_retries() {
        let mut runner = ExperimentRunner::new(Some(42), 0.3);
        runner.set_mock_delay(Duration::from_millis(1));
        let config = ProfileConfig {
            duration_seconds: 100,
            failures_per_interval: 5,
            interval_seconds: 10,
            ..ProfileConfig::default()
        };
        let result = runner.run_resilience(&config).await;
        assert_eq!(result.total_generated, 50);
        // With a 30% injection rate across five sites, some violations
        // must have hit a retryable error.
        let retried = result.metadata["violations_retried"].as_u64().unwrap();
        assert!(retried > 0);
        assert!(result.total_processed + result.total_failed == 50);
    }

    // ── scalability ──

    #[tokio::test(start_paused = true)]
    async fn test_scalability_one_result_per_size() {
        let mut runner = ExperimentRunner::new(Some(3), 0.0);
        let results = runner
            .run_scalability(&["small", "medium", "large"], &quick_config())
            .await;
        assert_eq!(results.len(), 3);
        for (result, size) in results.iter().zip(["small", "medium", "large"]) {
            assert_eq!(result.experiment_type, "scalability");
            assert_eq!(result.metadata["repo_size"], *size);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scalability_larger_repos_slower() {
        let mut runner = ExperimentRunner::new(Some(3), 0.0);
        let results = runner.run_scalability(&["small", "large"], &quick_config()).await;
        let small_mean = results[0].latency_stats().unwrap().mean;
        let large_mean = results[1].latency_stats().unwrap().mean;
        assert!(large_mean > small_mean);
    }
}
