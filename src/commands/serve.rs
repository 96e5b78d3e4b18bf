use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use terrafix::api::{self, ApiState};
use terrafix::config::Config;
use terrafix::dedup::DedupStore;
use terrafix::generator::RemediationGenerator;
use terrafix::git::SecureGitClient;
use terrafix::logging;
use terrafix::monitor::MonitorClient;
use terrafix::orchestrator::PipelineDeps;
use terrafix::pr::PrCreator;
use terrafix::service;
use terrafix::validator::Validator;

pub async fn run() -> Result<()> {
    let config = Arc::new(Config::from_env().context("Failed to load configuration")?);
    logging::init(&config.log_level, config.log_json);

    println!("Starting TerraFix service...\n");
    info!(version = env!("CARGO_PKG_VERSION"), "service_starting");

    print!("  Configuration ............... ");
    println!(
        "OK (poll {}s, {} workers)",
        config.poll_interval_seconds, config.max_workers
    );

    print!("  Deduplication store ......... ");
    let store = match DedupStore::connect(
        &config.redis_url,
        "terrafix:",
        config.state_retention_days,
    )
    .await
    {
        Ok(store) => {
            println!("OK");
            store
        }
        Err(e) => {
            println!("FAIL");
            anyhow::bail!("Cannot reach deduplication store: {e}");
        }
    };

    print!("  Monitor API ................. ");
    let monitor = match MonitorClient::new(&config.monitor_base_url, &config.monitor_auth).await {
        Ok(monitor) => {
            println!("OK");
            Arc::new(monitor)
        }
        Err(e) => {
            println!("FAIL");
            anyhow::bail!("Cannot initialize monitor client: {e}");
        }
    };

    print!("  Terraform CLI ............... ");
    let validator = match Validator::new("terraform").await {
        Ok(validator) => {
            println!("OK");
            Some(validator)
        }
        Err(e) => {
            println!("unavailable (fixes will skip validation)");
            warn!(error = %e, "terraform_cli_unavailable");
            None
        }
    };

    let generator = RemediationGenerator::new(
        &config.inference_region,
        &config.inference_model_id,
        config.inference_endpoint.as_deref(),
    )?;
    let pr = PrCreator::new(&config.github_token)?;
    let git = SecureGitClient::new(&config.github_token);

    let deps = Arc::new(PipelineDeps {
        config: config.clone(),
        store,
        git,
        generator,
        pr,
        validator,
    });

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    super::spawn_signal_listener(shutdown_tx.clone());

    // HTTP API runs alongside the polling loop; both observe the same
    // shutdown channel.
    let api_state = ApiState::real(deps.clone());
    let api_addr = config
        .api_addr
        .parse()
        .with_context(|| format!("Invalid TERRAFIX_API_ADDR '{}'", config.api_addr))?;
    let api_shutdown = shutdown_tx.subscribe();
    let api_handle = {
        let api_state = api_state.clone();
        tokio::spawn(async move { api::serve(api_state, api_addr, api_shutdown).await })
    };

    println!("  HTTP API .................... http://{api_addr}");
    println!("\nTerraFix service running. Press Ctrl+C to stop.\n");
    println!("{}", "=".repeat(70));

    let loop_shutdown = shutdown_tx.subscribe();
    service::run(config, monitor, deps, loop_shutdown).await;

    println!("\n{}", "=".repeat(70));
    println!("Shutdown signal received. Stopping TerraFix service...");

    let _ = shutdown_tx.send(());
    let _ = api_handle.await;

    info!("service_stopped");
    println!("TerraFix service stopped.");
    Ok(())
}
