use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "terrafix")]
#[command(about = "Continuous compliance remediation for Terraform")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the polling service loop (monitor → pipeline → pull requests)
    Serve,

    /// Run the HTTP API server (webhook ingestion, health, metrics)
    Api {
        /// Run in mock mode: no external services, simulated processing
        #[arg(long)]
        mock: bool,

        /// Simulated processing latency in mock mode (milliseconds)
        #[arg(long, default_value_t = 100.0)]
        mock_latency_ms: f64,

        /// Simulated failure probability in mock mode (0.0 to 1.0)
        #[arg(long, default_value_t = 0.0)]
        mock_failure_rate: f64,
    },

    /// Validate configuration and check connectivity to external services
    Check,

    /// Run pipeline characterization experiments
    Experiment {
        #[command(subcommand)]
        kind: ExperimentKind,
    },
}

#[derive(Subcommand)]
pub enum ExperimentKind {
    /// Measure processing capacity under a workload profile
    Throughput {
        #[command(flatten)]
        opts: ExperimentOpts,
    },

    /// Inject failures and measure recovery through retries
    Resilience {
        #[command(flatten)]
        opts: ExperimentOpts,

        /// Failure injection probability (0.0 to 1.0)
        #[arg(long, default_value_t = 0.2)]
        failure_rate: f64,
    },

    /// Compare throughput across repository-size labels
    Scalability {
        #[command(flatten)]
        opts: ExperimentOpts,

        /// Repository sizes to iterate
        #[arg(long, value_delimiter = ',', default_value = "small,medium,large")]
        repo_sizes: Vec<String>,
    },
}

#[derive(Args)]
pub struct ExperimentOpts {
    /// Workload profile: steady, burst, or cascade — or a preset name
    /// (quick, baseline, stress, resilience, production-like)
    #[arg(long, default_value = "baseline")]
    pub profile: String,

    /// Experiment duration in seconds (overrides the preset)
    #[arg(long)]
    pub duration: Option<u64>,

    /// Base violations per interval (overrides the preset)
    #[arg(long)]
    pub rate: Option<u32>,

    /// Seconds between generation intervals (overrides the preset)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Random seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the JSON report here
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Write the CSV report here
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Write SVG charts and the HTML rollup into this directory
    #[arg(long)]
    pub charts: Option<PathBuf>,
}

impl ExperimentOpts {
    pub fn json_path(&self) -> Option<&Path> {
        self.json.as_deref()
    }

    pub fn csv_path(&self) -> Option<&Path> {
        self.csv.as_deref()
    }

    pub fn charts_dir(&self) -> Option<&Path> {
        self.charts.as_deref()
    }
}
