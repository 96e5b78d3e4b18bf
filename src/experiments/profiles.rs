use serde::{Deserialize, Serialize};

/* ============================= PROFILES ============================= */

/// Workload shapes for synthetic violation generation.
///
/// - `Steady`: constant rate, baseline measurement.
/// - `Burst`: multiplier × base inside alternating burst windows, base
///   outside. Stresses queue behavior.
/// - `Cascade`: geometric growth per interval. Finds breaking points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadProfile {
    Steady,
    Burst,
    Cascade,
}

impl WorkloadProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadProfile::Steady => "steady",
            WorkloadProfile::Burst => "burst",
            WorkloadProfile::Cascade => "cascade",
        }
    }
}

/* ============================= CONFIG ============================= */

/// Controls pacing, volume, and composition of a generated workload.
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    pub profile: WorkloadProfile,
    pub duration_seconds: u64,
    pub failures_per_interval: u32,
    pub interval_seconds: u64,
    pub burst_multiplier: u32,
    pub burst_duration_seconds: u64,
    pub cascade_growth_rate: f64,
    pub resource_types: Vec<String>,
    /// (severity, weight) pairs for the severity draw.
    pub severity_weights: Vec<(&'static str, f64)>,
    pub repo_size: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        ProfileConfig {
            profile: WorkloadProfile::Steady,
            duration_seconds: 300,
            failures_per_interval: 5,
            interval_seconds: 10,
            burst_multiplier: 10,
            burst_duration_seconds: 30,
            cascade_growth_rate: 1.5,
            resource_types: vec![
                "AWS::S3::Bucket".to_string(),
                "AWS::IAM::Role".to_string(),
                "AWS::EC2::SecurityGroup".to_string(),
            ],
            severity_weights: vec![
                ("critical", 0.1),
                ("high", 0.3),
                ("medium", 0.4),
                ("low", 0.2),
            ],
            repo_size: "medium".to_string(),
        }
    }
}

impl ProfileConfig {
    /// How many violations to emit for the interval starting at `elapsed`
    /// seconds into the run.
    pub fn failures_for_interval(&self, elapsed_seconds: u64) -> u32 {
        match self.profile {
            WorkloadProfile::Steady => self.failures_per_interval,
            WorkloadProfile::Burst => {
                let cycle = elapsed_seconds % (self.burst_duration_seconds * 2);
                if cycle < self.burst_duration_seconds {
                    self.failures_per_interval * self.burst_multiplier
                } else {
                    self.failures_per_interval
                }
            }
            WorkloadProfile::Cascade => {
                let intervals_elapsed = elapsed_seconds / self.interval_seconds.max(1);
                let multiplier = self.cascade_growth_rate.powi(intervals_elapsed as i32);
                (f64::from(self.failures_per_interval) * multiplier) as u32
            }
        }
    }
}

/* ============================= PRESETS ============================= */

/// Named configurations for common experiment scenarios.
pub fn preset(name: &str) -> Option<ProfileConfig> {
    match name {
        "quick" => Some(ProfileConfig {
            duration_seconds: 60,
            failures_per_interval: 2,
            ..ProfileConfig::default()
        }),
        "baseline" => Some(ProfileConfig::default()),
        "stress" => Some(ProfileConfig {
            profile: WorkloadProfile::Burst,
            duration_seconds: 600,
            burst_multiplier: 20,
            ..ProfileConfig::default()
        }),
        "resilience" => Some(ProfileConfig {
            profile: WorkloadProfile::Cascade,
            failures_per_interval: 2,
            ..ProfileConfig::default()
        }),
        "production-like" => Some(ProfileConfig {
            duration_seconds: 3600,
            failures_per_interval: 10,
            interval_seconds: 60,
            repo_size: "large".to_string(),
            ..ProfileConfig::default()
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── steady ──

    #[test]
    fn test_steady_constant_rate() {
        let config = ProfileConfig::default();
        assert_eq!(config.failures_for_interval(0), 5);
        assert_eq!(config.failures_for_interval(100), 5);
        assert_eq!(config.failures_for_interval(290), 5);
    }

    // ── burst ──

    #[test]
    fn test_burst_alternates() {
        let config = ProfileConfig {
            profile: WorkloadProfile::Burst,
            failures_per_interval: 5,
            burst_multiplier: 10,
            burst_duration_seconds: 30,
            ..ProfileConfig::default()
        };
        // Inside the burst window
        assert_eq!(config.failures_for_interval(0), 50);
        assert_eq!(config.failures_for_interval(29), 50);
        // Outside the burst window
        assert_eq!(config.failures_for_interval(30), 5);
        assert_eq!(config.failures_for_interval(59), 5);
        // Next cycle bursts again
        assert_eq!(config.failures_for_interval(60), 50);
    }

    // ── cascade ──

    #[test]
    fn test_cascade_geometric_growth() {
        let config = ProfileConfig {
            profile: WorkloadProfile::Cascade,
            failures_per_interval: 2,
            interval_seconds: 10,
            cascade_growth_rate: 1.5,
            ..ProfileConfig::default()
        };
        // floor(2 * 1.5^i) per interval: 2, 3, 4, 6, 10, 15
        assert_eq!(config.failures_for_interval(0), 2);
        assert_eq!(config.failures_for_interval(10), 3);
        assert_eq!(config.failures_for_interval(20), 4);
        assert_eq!(config.failures_for_interval(30), 6);
        assert_eq!(config.failures_for_interval(40), 10);
        assert_eq!(config.failures_for_interval(50), 15);
    }

    #[test]
    fn test_cascade_total_over_sixty_seconds() {
        let config = ProfileConfig {
            profile: WorkloadProfile::Cascade,
            duration_seconds: 60,
            failures_per_interval: 2,
            interval_seconds: 10,
            cascade_growth_rate: 1.5,
            ..ProfileConfig::default()
        };
        let total: u32 = (0..6).map(|i| config.failures_for_interval(i * 10)).sum();
        assert_eq!(total, 40);
    }

    // ── presets ──

    #[test]
    fn test_presets_exist() {
        for name in ["quick", "baseline", "stress", "resilience", "production-like"] {
            assert!(preset(name).is_some(), "missing preset {name}");
        }
        assert!(preset("nope").is_none());
    }

    #[test]
    fn test_stress_preset_is_burst() {
        let config = preset("stress").unwrap();
        assert_eq!(config.profile, WorkloadProfile::Burst);
        assert_eq!(config.burst_multiplier, 20);
    }

    #[test]
    fn test_profile_labels() {
        assert_eq!(WorkloadProfile::Steady.as_str(), "steady");
        assert_eq!(WorkloadProfile::Burst.as_str(), "burst");
        assert_eq!(WorkloadProfile::Cascade.as_str(), "cascade");
    }
}
