mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve => commands::serve::run().await,
        Commands::Api { mock, mock_latency_ms, mock_failure_rate } => {
            commands::api::run(mock, mock_latency_ms, mock_failure_rate).await
        }
        Commands::Check => commands::check::run().await,
        Commands::Experiment { kind } => commands::experiment::run(kind).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
