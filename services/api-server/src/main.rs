//! packd API server
//!
//! Tracks worker nodes, declares silent ones dead, and places pods onto
//! healthy nodes by CPU.

use anyhow::Result;
use packd_api_server::{api, config, health::HealthWorker, state::AppState};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to PACKD_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting packd API server");
    info!(
        listen_addr = %config.listen_addr,
        policy = %config.cluster.placement_policy,
        heartbeat_interval_secs = config.cluster.heartbeat_interval.as_secs(),
        heartbeat_timeout_secs = config.cluster.heartbeat_timeout().as_secs(),
        "Configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState::new(config.cluster.clone(), shutdown_rx.clone());

    let health_worker = HealthWorker::new(state.health_monitor(), config.cluster.monitor_interval);
    let health_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            health_worker.run(shutdown_rx).await;
        }
    });

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, health_handle).await {
        warn!(error = %e, "Health monitor did not shut down in time");
    }

    info!("API server shutdown complete");
    Ok(())
}
