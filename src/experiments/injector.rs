use std::collections::BTreeSet;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::errors::Error;

/* ============================= FAILURE MODES ============================= */

/// External-call sites where failures can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureMode {
    InferenceThrottle,
    RepoHostRateLimit,
    CloneTimeout,
    DedupDisconnect,
    NetworkError,
}

impl FailureMode {
    pub const ALL: [FailureMode; 5] = [
        FailureMode::InferenceThrottle,
        FailureMode::RepoHostRateLimit,
        FailureMode::CloneTimeout,
        FailureMode::DedupDisconnect,
        FailureMode::NetworkError,
    ];

    fn make_error(&self) -> Error {
        match self {
            FailureMode::InferenceThrottle => Error::inference(
                "Rate exceeded [injected failure]",
                Some("ThrottlingException".to_string()),
            ),
            FailureMode::RepoHostRateLimit => {
                Error::repo_host("API rate limit exceeded [injected failure]", Some(429))
            }
            FailureMode::CloneTimeout => {
                Error::repo_host("git clone timed out [injected failure]", None)
            }
            FailureMode::DedupDisconnect => {
                Error::dedup_store("Connection refused [injected failure]", "injected")
            }
            FailureMode::NetworkError => {
                Error::monitor_api("Failed to establish connection [injected failure]", None)
            }
        }
    }
}

/* ============================= INJECTOR ============================= */

struct InjectorState {
    rng: StdRng,
    enabled: BTreeSet<FailureMode>,
    injections: u64,
    failures: u64,
}

/// Probabilistic failure injection for resilience experiments.
///
/// The mock pipeline consults `check` at each external-call site; an
/// enabled mode fails with the configured probability and the
/// corresponding typed error, so retry classification is exercised exactly
/// as it would be against the real services.
pub struct FailureInjector {
    failure_rate: f64,
    state: Mutex<InjectorState>,
}

impl FailureInjector {
    pub fn new(failure_rate: f64, seed: Option<u64>) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0"
        );
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        FailureInjector {
            failure_rate,
            state: Mutex::new(InjectorState {
                rng,
                enabled: BTreeSet::new(),
                injections: 0,
                failures: 0,
            }),
        }
    }

    pub fn enable(&self, mode: FailureMode) -> &Self {
        self.state.lock().expect("injector lock").enabled.insert(mode);
        self
    }

    pub fn enable_all(&self) -> &Self {
        let mut state = self.state.lock().expect("injector lock");
        state.enabled.extend(FailureMode::ALL);
        self
    }

    pub fn disable_all(&self) {
        self.state.lock().expect("injector lock").enabled.clear();
    }

    /// Consult the injector at one call site. Returns the mode's error
    /// with probability `failure_rate` when the mode is enabled.
    pub fn check(&self, mode: FailureMode) -> Result<(), Error> {
        let mut state = self.state.lock().expect("injector lock");
        if !state.enabled.contains(&mode) {
            return Ok(());
        }
        state.injections += 1;
        if state.rng.r#gen::<f64>() < self.failure_rate {
            state.failures += 1;
            return Err(mode.make_error());
        }
        Ok(())
    }

    /// Injection statistics: attempts, failures, configured and actual rates.
    pub fn stats(&self) -> serde_json::Value {
        let state = self.state.lock().expect("injector lock");
        let actual = if state.injections > 0 {
            state.failures as f64 / state.injections as f64
        } else {
            0.0
        };
        json!({
            "total_injections": state.injections,
            "failures_injected": state.failures,
            "configured_rate": self.failure_rate,
            "actual_rate": actual,
        })
    }

    pub fn reset_stats(&self) {
        let mut state = self.state.lock().expect("injector lock");
        state.injections = 0;
        state.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── enable / disable ──

    #[test]
    fn test_disabled_mode_never_fails() {
        let injector = FailureInjector::new(1.0, Some(1));
        for _ in 0..50 {
            assert!(injector.check(FailureMode::InferenceThrottle).is_ok());
        }
    }

    #[test]
    fn test_enabled_mode_fails_at_rate_one() {
        let injector = FailureInjector::new(1.0, Some(1));
        injector.enable(FailureMode::InferenceThrottle);
        assert!(injector.check(FailureMode::InferenceThrottle).is_err());
        // Other modes still clean
        assert!(injector.check(FailureMode::CloneTimeout).is_ok());
    }

    #[test]
    fn test_rate_zero_never_fails() {
        let injector = FailureInjector::new(0.0, Some(1));
        injector.enable_all();
        for mode in FailureMode::ALL {
            assert!(injector.check(mode).is_ok());
        }
    }

    #[test]
    fn test_enable_all_covers_every_mode() {
        let injector = FailureInjector::new(1.0, Some(1));
        injector.enable_all();
        for mode in FailureMode::ALL {
            assert!(injector.check(mode).is_err());
        }
    }

    #[test]
    fn test_disable_all() {
        let injector = FailureInjector::new(1.0, Some(1));
        injector.enable_all();
        injector.disable_all();
        assert!(injector.check(FailureMode::NetworkError).is_ok());
    }

    // ── error typing ──

    #[test]
    fn test_injected_throttle_is_retryable() {
        let err = FailureMode::InferenceThrottle.make_error();
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "inference");
    }

    #[test]
    fn test_injected_rate_limit_is_retryable() {
        let err = FailureMode::RepoHostRateLimit.make_error();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_injected_dedup_disconnect_is_permanent() {
        let err = FailureMode::DedupDisconnect.make_error();
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "dedup-store");
    }

    // ── statistics ──

    #[test]
    fn test_stats_track_rates() {
        let injector = FailureInjector::new(0.5, Some(42));
        injector.enable(FailureMode::NetworkError);
        for _ in 0..200 {
            let _ = injector.check(FailureMode::NetworkError);
        }
        let stats = injector.stats();
        assert_eq!(stats["total_injections"], 200);
        let actual = stats["actual_rate"].as_f64().unwrap();
        assert!((actual - 0.5).abs() < 0.15, "actual rate {actual} far from configured");
    }

    #[test]
    fn test_stats_reset() {
        let injector = FailureInjector::new(1.0, Some(1));
        injector.enable_all();
        let _ = injector.check(FailureMode::NetworkError);
        injector.reset_stats();
        assert_eq!(injector.stats()["total_injections"], 0);
    }

    #[test]
    #[should_panic(expected = "failure_rate")]
    fn test_invalid_rate_panics() {
        let _ = FailureInjector::new(1.5, None);
    }

    #[test]
    fn test_seeded_injector_reproducible() {
        let a = FailureInjector::new(0.5, Some(9));
        let b = FailureInjector::new(0.5, Some(9));
        a.enable(FailureMode::NetworkError);
        b.enable(FailureMode::NetworkError);
        for _ in 0..50 {
            assert_eq!(
                a.check(FailureMode::NetworkError).is_err(),
                b.check(FailureMode::NetworkError).is_err()
            );
        }
    }
}
