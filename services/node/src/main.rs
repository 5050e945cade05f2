//! packd node agent
//!
//! Registers this machine's CPU capacity with the API server and keeps its
//! heartbeat alive until interrupted.

use std::time::Duration;

use anyhow::Result;
use packd_node::{config::Config, ApiClient, NodeAgent};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Prefer RUST_LOG, fall back to PACKD_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting packd node agent");
    info!(
        api_url = %config.api_url,
        cpu_cores = config.cpu_cores,
        "Configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let client = ApiClient::new(&config.api_url)?;
    let agent = NodeAgent::new(
        client,
        config.cpu_cores,
        Duration::from_secs(config.heartbeat_interval_secs),
    );
    let mut agent_handle = tokio::spawn(async move { agent.run(shutdown_rx).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut agent_handle => {
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %e, "Node agent stopped");
                    Err(e.into())
                }
                Err(e) => {
                    error!(error = %e, "Node agent task panicked");
                    Err(e.into())
                }
            };
        }
    }

    let _ = shutdown_tx.send(true);

    let shutdown_timeout = Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, agent_handle).await {
        warn!(error = %e, "Node agent did not shut down in time");
    }

    info!("Node agent shutdown complete");
    Ok(())
}
