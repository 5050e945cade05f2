//! Health monitor background worker.
//!
//! Runs a health scan on a periodic interval.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, instrument};

use super::monitor::HealthMonitor;

/// Drives [`HealthMonitor`] on a fixed cadence until shutdown.
pub struct HealthWorker {
    monitor: HealthMonitor,
    interval: Duration,
}

impl HealthWorker {
    pub fn new(monitor: HealthMonitor, interval: Duration) -> Self {
        Self { monitor, interval }
    }

    /// Run the worker until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.monitor.heartbeat_timeout().as_secs(),
            "Starting health monitor"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stats = self.monitor.scan().await;
                    if stats.nodes_marked_dead > 0 {
                        info!(
                            nodes_checked = stats.nodes_checked,
                            nodes_marked_dead = stats.nodes_marked_dead,
                            pods_orphaned = stats.pods_orphaned,
                            "Health scan reclaimed dead nodes"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Health monitor shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::{NodeStatus, NodeStore};

    #[tokio::test(start_paused = true)]
    async fn test_worker_marks_silent_node_within_one_cycle() {
        let store = Arc::new(NodeStore::new());
        let silent = store.register(4).await.unwrap();
        let chatty = store.register(4).await.unwrap();

        let worker = HealthWorker::new(
            HealthMonitor::new(Arc::clone(&store), Duration::from_secs(15)),
            Duration::from_secs(5),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

        // Keep one node alive across the timeout; the other goes quiet.
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(5)).await;
            store.heartbeat(chatty).await.unwrap();
        }
        // 20s silent: past the 15s timeout, and at least one scan has run since.
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(store.node(silent).await.unwrap().status, NodeStatus::Dead);
        assert_eq!(store.node(chatty).await.unwrap().status, NodeStatus::Healthy);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_stops_on_shutdown() {
        let worker = HealthWorker::new(
            HealthMonitor::new(Arc::new(NodeStore::new()), Duration::from_secs(15)),
            Duration::from_secs(5),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_secs(12)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
