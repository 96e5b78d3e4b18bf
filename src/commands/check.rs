use anyhow::Result;

use terrafix::config::Config;
use terrafix::dedup::DedupStore;
use terrafix::validator::Validator;

/// Startup self-check: configuration, dedup store, and the external
/// binaries the pipeline shells out to.
pub async fn run() -> Result<()> {
    println!("TerraFix environment check\n");

    let mut failures = 0;

    print!("  Configuration ............... ");
    let config = match Config::from_env() {
        Ok(config) => {
            println!("OK");
            Some(config)
        }
        Err(e) => {
            println!("FAIL ({e})");
            failures += 1;
            None
        }
    };

    print!("  Deduplication store ......... ");
    match &config {
        Some(config) => {
            match DedupStore::connect(&config.redis_url, "terrafix:", config.state_retention_days)
                .await
            {
                Ok(store) => match store.statistics().await {
                    Ok(stats) => println!("OK ({} records)", stats.get("total").unwrap_or(&0)),
                    Err(e) => {
                        println!("FAIL ({e})");
                        failures += 1;
                    }
                },
                Err(e) => {
                    println!("FAIL ({e})");
                    failures += 1;
                }
            }
        }
        None => println!("skipped (no configuration)"),
    }

    print!("  Terraform CLI ............... ");
    match Validator::new("terraform").await {
        Ok(_) => println!("OK"),
        Err(_) => {
            println!("unavailable (fixes will skip validation)");
        }
    }

    print!("  Git CLI ..................... ");
    match tokio::process::Command::new("git").arg("--version").output().await {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            println!("OK ({})", version.trim());
        }
        _ => {
            println!("FAIL (git not found)");
            failures += 1;
        }
    }

    if let Some(config) = &config {
        print!("  Repository mapping .......... ");
        if config.repo_mapping.is_empty() {
            println!("empty (all violations will fail as unmapped)");
        } else {
            println!("OK ({} patterns)", config.repo_mapping.len());
        }
    }

    println!();
    if failures > 0 {
        anyhow::bail!("{failures} check(s) failed");
    }
    println!("All checks passed.");
    Ok(())
}
