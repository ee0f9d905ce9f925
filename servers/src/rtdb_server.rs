use anyhow::{Context, Result};
use lib_rtdb::loggers;
use lib_rtdb::RtdbServer;
use std::sync::Arc;
use tokio::signal;

mod rtdb_logic;
use rtdb_logic::{config, downstream, state};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    let log_path = loggers::setup_logging(&config.log_dir(), "rtdb_server", config.log_level())
        .context("Failed to set up logging")?;
    log::info!("Logging to {}", log_path.display());

    let data = config.bootstrap_data()?;
    let server = Arc::new(RtdbServer::new(config.server_options(), data));
    if let Some(rules) = config.rules_document()? {
        server.set_rules_json(&rules)?;
    }

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = state::AppState::new(server, shutdown_tx.clone());

    let downstream_handle = tokio::spawn(downstream::run(config.clone(), app_state));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    downstream_handle.await??;
    log::info!("Shutdown complete.");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            log::warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    // On non-unix platforms, just wait forever.
    std::future::pending::<()>().await;
}
