use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value, json};

use crate::monitor::{Severity, Violation};

use super::profiles::ProfileConfig;

/* ============================= TEMPLATES ============================= */

struct Template {
    test_id: &'static str,
    test_name: &'static str,
    failure_reason: &'static str,
    framework: &'static str,
    current_state: fn() -> Value,
    required_state: fn() -> Value,
}

fn templates_for(resource_type: &str) -> &'static [Template] {
    match resource_type {
        "AWS::S3::Bucket" => &S3_TEMPLATES,
        "AWS::IAM::Role" => &IAM_TEMPLATES,
        "AWS::EC2::SecurityGroup" => &SG_TEMPLATES,
        "AWS::RDS::DBInstance" => &RDS_TEMPLATES,
        _ => &S3_TEMPLATES,
    }
}

static S3_TEMPLATES: [Template; 3] = [
    Template {
        test_id: "s3-public-access-block",
        test_name: "S3 Bucket Block Public Access",
        failure_reason: "S3 bucket does not have public access blocked",
        framework: "SOC2",
        current_state: || {
            json!({
                "block_public_acls": false,
                "block_public_policy": false,
                "ignore_public_acls": false,
                "restrict_public_buckets": false,
            })
        },
        required_state: || {
            json!({
                "block_public_acls": true,
                "block_public_policy": true,
                "ignore_public_acls": true,
                "restrict_public_buckets": true,
            })
        },
    },
    Template {
        test_id: "s3-versioning-enabled",
        test_name: "S3 Bucket Versioning",
        failure_reason: "S3 bucket does not have versioning enabled",
        framework: "SOC2",
        current_state: || json!({"versioning": "Disabled"}),
        required_state: || json!({"versioning": "Enabled"}),
    },
    Template {
        test_id: "s3-encryption-at-rest",
        test_name: "S3 Bucket Encryption",
        failure_reason: "S3 bucket does not have server-side encryption",
        framework: "ISO27001",
        current_state: || json!({"encryption": null}),
        required_state: || json!({"encryption": "AES256"}),
    },
];

static IAM_TEMPLATES: [Template; 2] = [
    Template {
        test_id: "iam-session-duration",
        test_name: "IAM Role Maximum Session Duration",
        failure_reason: "IAM role session duration exceeds policy limit",
        framework: "SOC2",
        current_state: || json!({"max_session_duration": 43200}),
        required_state: || json!({"max_session_duration": 3600}),
    },
    Template {
        test_id: "iam-trust-policy",
        test_name: "IAM Role Trust Policy Review",
        failure_reason: "IAM role trust policy allows overly broad access",
        framework: "SOC2",
        current_state: || json!({"trust_policy_principals": ["*"]}),
        required_state: || json!({"trust_policy_principals": ["ecs-tasks.amazonaws.com"]}),
    },
];

static SG_TEMPLATES: [Template; 2] = [
    Template {
        test_id: "sg-open-ssh",
        test_name: "Security Group SSH Access",
        failure_reason: "Security group allows SSH from 0.0.0.0/0",
        framework: "SOC2",
        current_state: || json!({"ssh_cidr": "0.0.0.0/0"}),
        required_state: || json!({"ssh_cidr": "10.0.0.0/8"}),
    },
    Template {
        test_id: "sg-open-rdp",
        test_name: "Security Group RDP Access",
        failure_reason: "Security group allows RDP from 0.0.0.0/0",
        framework: "ISO27001",
        current_state: || json!({"rdp_cidr": "0.0.0.0/0"}),
        required_state: || json!({"rdp_cidr": "10.0.0.0/8"}),
    },
];

static RDS_TEMPLATES: [Template; 2] = [
    Template {
        test_id: "rds-encryption",
        test_name: "RDS Encryption at Rest",
        failure_reason: "RDS instance does not have encryption enabled",
        framework: "SOC2",
        current_state: || json!({"storage_encrypted": false}),
        required_state: || json!({"storage_encrypted": true}),
    },
    Template {
        test_id: "rds-public-access",
        test_name: "RDS Public Accessibility",
        failure_reason: "RDS instance is publicly accessible",
        framework: "SOC2",
        current_state: || json!({"publicly_accessible": true}),
        required_state: || json!({"publicly_accessible": false}),
    },
];

/* ============================= GENERATOR ============================= */

const REGIONS: [&str; 4] = ["us-east-1", "us-west-2", "eu-west-1", "ap-northeast-1"];
const BUCKET_PREFIXES: [&str; 7] = ["data", "logs", "backup", "assets", "config", "staging", "prod"];
const ROLE_PREFIXES: [&str; 6] = ["lambda", "ecs", "ec2", "service", "app", "api"];
const ROLE_SUFFIXES: [&str; 4] = ["role", "execution-role", "task-role", "service-role"];

/// Synthesizes realistic compliance violations for benchmarks and load
/// tests, with no live monitor required. A fixed seed makes runs
/// reproducible.
pub struct SyntheticGenerator {
    rng: StdRng,
    counter: u64,
}

impl SyntheticGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        SyntheticGenerator { rng, counter: 0 }
    }

    fn random_suffix(&mut self, len: usize) -> String {
        const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
        (0..len)
            .map(|_| CHARS[self.rng.gen_range(0..CHARS.len())] as char)
            .collect()
    }

    fn resource_id(&mut self) -> String {
        self.counter += 1;
        let counter = self.counter;
        format!("res-{:05}-{}", counter, self.random_suffix(8))
    }

    fn arn_for(&mut self, resource_type: &str) -> String {
        let account: u64 = self.rng.gen_range(100_000_000_000..=999_999_999_999);
        let region = REGIONS.choose(&mut self.rng).expect("non-empty");

        match resource_type {
            "AWS::S3::Bucket" => {
                let prefix = BUCKET_PREFIXES.choose(&mut self.rng).expect("non-empty");
                let suffix = self.random_suffix(8);
                format!("arn:aws:s3:::{prefix}-{suffix}")
            }
            "AWS::IAM::Role" => {
                let prefix = ROLE_PREFIXES.choose(&mut self.rng).expect("non-empty");
                let suffix = ROLE_SUFFIXES.choose(&mut self.rng).expect("non-empty");
                let name = self.random_suffix(6);
                format!("arn:aws:iam::{account}:role/{prefix}-{name}-{suffix}")
            }
            "AWS::EC2::SecurityGroup" => {
                let sg_id: u32 = self.rng.gen_range(0x1000_0000..=0x9999_9999);
                format!("arn:aws:ec2:{region}:{account}:security-group/sg-{sg_id:08x}")
            }
            "AWS::RDS::DBInstance" => {
                let name = self.random_suffix(8);
                format!("arn:aws:rds:{region}:{account}:db:db-{name}")
            }
            _ => {
                let id = self.resource_id();
                format!("arn:aws:unknown:{region}:{account}:resource/{id}")
            }
        }
    }

    fn draw_severity(&mut self, weights: &[(&'static str, f64)]) -> Severity {
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        let mut draw = self.rng.r#gen::<f64>() * total;
        for (name, weight) in weights {
            draw -= weight;
            if draw <= 0.0 {
                return match *name {
                    "critical" => Severity::Critical,
                    "high" => Severity::High,
                    "low" => Severity::Low,
                    _ => Severity::Medium,
                };
            }
        }
        Severity::Medium
    }

    /// Generate one synthetic violation.
    pub fn generate(&mut self, resource_type: &str, severity: Severity) -> Violation {
        let templates = templates_for(resource_type);
        let index = self.rng.gen_range(0..templates.len());
        let template = &templates[index];

        let arn = self.arn_for(resource_type);
        let resource_id = self.resource_id();
        self.counter += 1;

        let current = match (template.current_state)() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let required = match (template.required_state)() {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let name = crate::analyzer::extract_name_from_arn(&arn);
        let mut details = Map::new();
        details.insert("name".to_string(), Value::String(name));

        Violation {
            test_id: format!("{}-{}", template.test_id, self.counter),
            test_name: template.test_name.to_string(),
            resource_arn: arn,
            resource_type: resource_type.to_string(),
            failure_reason: template.failure_reason.to_string(),
            severity,
            framework: template.framework.to_string(),
            failed_at: chrono::Utc::now().to_rfc3339(),
            current_state: current,
            required_state: required,
            resource_id: Some(resource_id),
            resource_details: details,
            extra: Map::new(),
        }
    }

    /// Generate one violation drawn from the profile's resource mix and
    /// severity distribution.
    pub fn generate_from_config(&mut self, config: &ProfileConfig) -> Violation {
        let resource_type = config
            .resource_types
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| "AWS::S3::Bucket".to_string());
        let severity = self.draw_severity(&config.severity_weights);
        self.generate(&resource_type, severity)
    }

    /// Finite paced stream of violations: each interval's batch is yielded
    /// item by item, with the profile's interval slept off between batches.
    pub fn into_stream(
        self,
        config: ProfileConfig,
    ) -> impl futures::Stream<Item = Violation> {
        let interval_secs = config.interval_seconds.max(1);
        let interval = std::time::Duration::from_secs(interval_secs);
        let intervals = config.duration_seconds / interval_secs;

        futures::stream::unfold(
            (self, 0u64, Vec::<Violation>::new()),
            move |(mut generator, mut tick, mut pending)| {
                let config = config.clone();
                async move {
                    loop {
                        if let Some(violation) = pending.pop() {
                            return Some((violation, (generator, tick, pending)));
                        }
                        if tick >= intervals {
                            return None;
                        }
                        if tick > 0 {
                            tokio::time::sleep(interval).await;
                        }
                        let count = config.failures_for_interval(tick * interval_secs);
                        pending = (0..count)
                            .map(|_| generator.generate_from_config(&config))
                            .collect();
                        pending.reverse();
                        tick += 1;
                    }
                }
            },
        )
    }

    /// Emit the finite batch sequence for a profile: one `Vec<Violation>`
    /// per interval. The runner paces the intervals with its own sleeps so
    /// a paused-clock test can drive the whole stream instantly.
    pub fn batches(&mut self, config: &ProfileConfig) -> Vec<Vec<Violation>> {
        let interval = config.interval_seconds.max(1);
        let intervals = config.duration_seconds / interval;
        (0..intervals)
            .map(|i| {
                let count = config.failures_for_interval(i * interval);
                (0..count).map(|_| self.generate_from_config(config)).collect()
            })
            .collect()
    }
}
