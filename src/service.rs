use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::metrics::{self, COLLECTOR, Stage};
use crate::monitor::MonitorClient;
use crate::orchestrator::{self, PipelineDeps};

/* ============================= CYCLE SUMMARY ============================= */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub total: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CycleSummary {
    pub fn record(&mut self, outcome: &orchestrator::ProcessingOutcome) {
        self.total += 1;
        if outcome.skipped {
            self.skipped += 1;
        } else if outcome.success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Remaining sleep for a cycle; never negative even when the cycle overran
/// the polling interval.
pub fn next_sleep(poll_interval: Duration, cycle_duration: Duration) -> Duration {
    poll_interval.saturating_sub(cycle_duration)
}

/* ============================= SERVICE LOOP ============================= */

const STATS_EVERY_CYCLES: u32 = 10;

/// Run the polling service until a shutdown signal arrives.
///
/// Each cycle fetches violations newer than `last_check`, fans them out to
/// the bounded worker pool, aggregates the counts, and sleeps off the
/// remainder of the polling interval in one-second slices so shutdown is
/// observed promptly. `last_check` advances to now *after* the fetch, so a
/// violation appearing mid-cycle is picked up next cycle rather than lost.
pub async fn run(
    config: Arc<Config>,
    monitor: Arc<MonitorClient>,
    deps: Arc<PipelineDeps>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut last_check: DateTime<Utc> = Utc::now() - chrono::Duration::hours(1);
    let mut cycle_count: u32 = 0;
    let poll_interval = Duration::from_secs(config.poll_interval_seconds);

    info!(
        poll_interval_seconds = config.poll_interval_seconds,
        max_workers = config.max_workers,
        last_check = %last_check.to_rfc3339(),
        "service_loop_started"
    );

    loop {
        if shutdown.try_recv().is_ok() {
            break;
        }

        let cycle_start = Instant::now();
        info!(last_check = %last_check.to_rfc3339(), "polling_cycle_started");

        let fetch_start = Instant::now();
        match monitor.fetch_failing_since(Some(last_check)).await {
            Ok(violations) => {
                metrics::record_stage(Stage::FetchMonitor, fetch_start.elapsed());
                info!(count = violations.len(), "violations_fetched");

                if !violations.is_empty() {
                    let summary =
                        process_batch(violations, config.max_workers, deps.clone()).await;
                    COLLECTOR.increment_by(
                        metrics::VIOLATIONS_PROCESSED_TOTAL,
                        &[],
                        summary.total as u64,
                    );
                    COLLECTOR.increment_by(
                        metrics::VIOLATIONS_SUCCESSFUL_TOTAL,
                        &[],
                        summary.successful as u64,
                    );
                    COLLECTOR.increment_by(
                        metrics::VIOLATIONS_SKIPPED_TOTAL,
                        &[],
                        summary.skipped as u64,
                    );
                    COLLECTOR.increment_by(
                        metrics::VIOLATIONS_FAILED_TOTAL,
                        &[],
                        summary.failed as u64,
                    );
                    info!(
                        total = summary.total,
                        successful = summary.successful,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        "polling_cycle_completed"
                    );
                }

                // Deliberately after the fetch: anything that appeared while
                // the cycle ran will be seen next cycle.
                last_check = Utc::now();
                COLLECTOR.set_gauge(
                    metrics::LAST_POLL_TIMESTAMP,
                    &[],
                    last_check.timestamp() as f64,
                );
            }
            Err(e) => {
                error!(error = %e, "polling_cycle_fetch_failed");
            }
        }

        cycle_count += 1;
        if cycle_count.is_multiple_of(STATS_EVERY_CYCLES) {
            match deps.store.statistics().await {
                Ok(stats) => info!(?stats, "dedup_store_statistics"),
                Err(e) => warn!(error = %e, "dedup_statistics_failed"),
            }
        }

        let sleep_total = next_sleep(poll_interval, cycle_start.elapsed());
        if sleep_if_running(sleep_total, &mut shutdown).await {
            break;
        }
    }

    info!("service_loop_exiting");
}

/// Dispatch a batch of violations into the bounded worker pool and wait for
/// all of them. Submission order is preserved; completion order is not.
pub async fn process_batch(
    violations: Vec<crate::monitor::Violation>,
    max_workers: usize,
    deps: Arc<PipelineDeps>,
) -> CycleSummary {
    let semaphore = Arc::new(Semaphore::new(max_workers));
    let mut pool: JoinSet<orchestrator::ProcessingOutcome> = JoinSet::new();

    COLLECTOR.set_gauge(metrics::QUEUE_DEPTH, &[], violations.len() as f64);
    COLLECTOR.set_gauge(metrics::ACTIVE_WORKERS, &[], max_workers.min(violations.len()) as f64);

    for violation in violations {
        let permit = semaphore.clone();
        let deps = deps.clone();
        pool.spawn(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore never closed");
            orchestrator::process_violation(&violation, &deps).await
        });
    }

    let mut summary = CycleSummary::default();
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(outcome) => summary.record(&outcome),
            Err(e) => {
                error!(error = %e, "worker_task_panicked");
                summary.total += 1;
                summary.failed += 1;
            }
        }
    }

    COLLECTOR.set_gauge(metrics::QUEUE_DEPTH, &[], 0.0);
    COLLECTOR.set_gauge(metrics::ACTIVE_WORKERS, &[], 0.0);

    summary
}

/// Sleep in one-second slices, returning true when shutdown arrived.
async fn sleep_if_running(total: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        let slice = remaining.min(Duration::from_secs(1));
        tokio::select! {
            _ = shutdown.recv() => return true,
            _ = tokio::time::sleep(slice) => {}
        }
        remaining = remaining.saturating_sub(slice);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ProcessingOutcome;

    fn outcome(success: bool, skipped: bool) -> ProcessingOutcome {
        ProcessingOutcome {
            success,
            fingerprint: "fp".into(),
            pr_url: None,
            error: None,
            skipped,
        }
    }

    // ── summary aggregation ──

    #[test]
    fn test_summary_counts_outcomes() {
        let mut summary = CycleSummary::default();
        summary.record(&outcome(true, false));
        summary.record(&outcome(true, true));
        summary.record(&outcome(false, false));
        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_summary_default_empty() {
        let summary = CycleSummary::default();
        assert_eq!(summary.total, 0);
    }

    // ── sleep computation ──

    #[test]
    fn test_next_sleep_normal() {
        assert_eq!(
            next_sleep(Duration::from_secs(300), Duration::from_secs(20)),
            Duration::from_secs(280)
        );
    }

    #[test]
    fn test_next_sleep_overrun_is_zero_not_negative() {
        assert_eq!(
            next_sleep(Duration::from_secs(10), Duration::from_secs(45)),
            Duration::ZERO
        );
    }

    // ── responsive sleep ──

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_to_completion_without_shutdown() {
        let (_tx, mut rx) = broadcast::channel::<()>(1);
        let interrupted = sleep_if_running(Duration::from_secs(3), &mut rx).await;
        assert!(!interrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_shutdown() {
        let (tx, mut rx) = broadcast::channel::<()>(1);
        tx.send(()).unwrap();
        let interrupted = sleep_if_running(Duration::from_secs(3600), &mut rx).await;
        assert!(interrupted);
    }

    #[tokio::test]
    async fn test_sleep_zero_duration_returns_immediately() {
        let (_tx, mut rx) = broadcast::channel::<()>(1);
        assert!(!sleep_if_running(Duration::ZERO, &mut rx).await);
    }
}
