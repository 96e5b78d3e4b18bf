use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::warn;

use terrafix::api::{self, ApiState};
use terrafix::config::Config;
use terrafix::dedup::DedupStore;
use terrafix::generator::RemediationGenerator;
use terrafix::git::SecureGitClient;
use terrafix::logging;
use terrafix::orchestrator::PipelineDeps;
use terrafix::pr::PrCreator;
use terrafix::validator::Validator;

pub async fn run(mock: bool, mock_latency_ms: f64, mock_failure_rate: f64) -> Result<()> {
    let state = if mock {
        // Mock mode needs no configuration beyond the listen address.
        logging::init("INFO", false);
        println!("Starting TerraFix API server (mock mode)...");
        println!("  Simulated latency ........... {mock_latency_ms}ms");
        println!("  Simulated failure rate ...... {mock_failure_rate}");
        ApiState::mock(mock_latency_ms, mock_failure_rate.clamp(0.0, 1.0))
    } else {
        let config = Arc::new(Config::from_env().context("Failed to load configuration")?);
        logging::init(&config.log_level, config.log_json);
        println!("Starting TerraFix API server...");

        let store =
            DedupStore::connect(&config.redis_url, "terrafix:", config.state_retention_days)
                .await
                .context("Cannot reach deduplication store")?;
        let validator = match Validator::new("terraform").await {
            Ok(validator) => Some(validator),
            Err(e) => {
                warn!(error = %e, "terraform_cli_unavailable");
                None
            }
        };
        let deps = Arc::new(PipelineDeps {
            config: config.clone(),
            store,
            git: SecureGitClient::new(&config.github_token),
            generator: RemediationGenerator::new(
                &config.inference_region,
                &config.inference_model_id,
                config.inference_endpoint.as_deref(),
            )?,
            pr: PrCreator::new(&config.github_token)?,
            validator,
        });
        ApiState::real(deps)
    };

    let addr_raw =
        std::env::var("TERRAFIX_API_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".to_string());
    let addr = addr_raw
        .parse()
        .with_context(|| format!("Invalid TERRAFIX_API_ADDR '{addr_raw}'"))?;

    println!("  Listening ................... http://{addr}");
    println!();
    println!("  Available endpoints:");
    println!("    POST /webhook ............. Process one violation");
    println!("    POST /batch ............... Process an array of violations");
    println!("    GET  /health .............. Liveness probe (always 200 OK)");
    println!("    GET  /ready ............... Readiness probe");
    println!("    GET  /status .............. Uptime and aggregate counters");
    println!("    GET  /metrics ............. Prometheus metrics");
    println!("    POST /configure ........... Adjust mock parameters");
    println!("    POST /stats/reset ......... Reset request statistics");
    println!();
    println!("API server running. Press Ctrl+C to stop.");

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    super::spawn_signal_listener(shutdown_tx);

    api::serve(state, addr, shutdown_rx).await?;

    println!("API server stopped.");
    Ok(())
}
