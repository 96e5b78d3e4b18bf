pub mod api;
pub mod check;
pub mod experiment;
pub mod serve;

use tokio::sync::broadcast;
use tracing::info;

/// Watch for INT/TERM and fan the shutdown out over the broadcast channel.
pub fn spawn_signal_listener(tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown_signal_received");
        let _ = tx.send(());
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
