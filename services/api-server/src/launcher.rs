//! Simulated node launcher.
//!
//! When there is no real machine to start, a node is registered in-process
//! and a background task heartbeats on its behalf. Terminating a simulated
//! node only stops that task; the health monitor declares it dead once the
//! heartbeat deadline passes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use packd_id::NodeId;
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, info, warn};

use crate::registration::{NodeRegistration, RegistrationHandler};
use crate::store::RegistryError;

/// Errors from launching or terminating nodes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("node {0} was not launched by this server or has already stopped")]
    NotLaunched(NodeId),
}

/// Starts and stops nodes on behalf of the operator.
#[async_trait]
pub trait NodeLauncher: Send + Sync {
    /// Start a node with `cpu_cores` of capacity and register it.
    async fn launch(&self, cpu_cores: i64) -> Result<NodeRegistration, LaunchError>;

    /// Stop a launched node's heartbeats.
    async fn terminate(&self, node_id: NodeId) -> Result<(), LaunchError>;
}

type StopHandles = Arc<Mutex<HashMap<NodeId, oneshot::Sender<()>>>>;

/// Runs nodes as in-process heartbeat tasks.
pub struct SimulatedLauncher {
    registration: Arc<RegistrationHandler>,
    running: StopHandles,
    shutdown: watch::Receiver<bool>,
}

impl SimulatedLauncher {
    pub fn new(registration: Arc<RegistrationHandler>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            registration,
            running: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    /// Whether a heartbeat task is still running for `node_id`.
    pub async fn is_running(&self, node_id: NodeId) -> bool {
        self.running.lock().await.contains_key(&node_id)
    }
}

#[async_trait]
impl NodeLauncher for SimulatedLauncher {
    async fn launch(&self, cpu_cores: i64) -> Result<NodeRegistration, LaunchError> {
        let registration = self.registration.register_node(cpu_cores).await?;
        let node_id = registration.node_id;

        let (stop_tx, stop_rx) = oneshot::channel();
        self.running.lock().await.insert(node_id, stop_tx);

        let task = SimulatedNode {
            node_id,
            registration: Arc::clone(&self.registration),
            running: Arc::clone(&self.running),
        };
        tokio::spawn(task.run(stop_rx, self.shutdown.clone()));

        info!(node_id = %node_id, cpu_cores = registration.cpu_cores, "Simulated node launched");
        Ok(registration)
    }

    async fn terminate(&self, node_id: NodeId) -> Result<(), LaunchError> {
        let stop = self
            .running
            .lock()
            .await
            .remove(&node_id)
            .ok_or(LaunchError::NotLaunched(node_id))?;

        // The task may have exited between the lookup and now.
        let _ = stop.send(());
        info!(node_id = %node_id, "Simulated node terminated, heartbeats stopped");
        Ok(())
    }
}

struct SimulatedNode {
    node_id: NodeId,
    registration: Arc<RegistrationHandler>,
    running: StopHandles,
}

impl SimulatedNode {
    async fn run(self, mut stop: oneshot::Receiver<()>, mut shutdown: watch::Receiver<bool>) {
        let node_id = self.node_id;
        let mut interval = tokio::time::interval(self.registration.heartbeat_interval());
        // Registration already counts as the first heartbeat.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.registration.heartbeat(node_id).await {
                        Ok(_) => {}
                        Err(e @ (RegistryError::NodeIsDead(_) | RegistryError::UnknownNode(_))) => {
                            warn!(node_id = %node_id, error = %e, "Simulated node heartbeat rejected, stopping");
                            break;
                        }
                        Err(e) => {
                            warn!(node_id = %node_id, error = %e, "Simulated node heartbeat failed");
                        }
                    }
                }
                _ = &mut stop => {
                    debug!(node_id = %node_id, "Simulated node stop requested");
                    break;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(node_id = %node_id, "Simulated node shutting down");
                        break;
                    }
                }
            }
        }

        self.running.lock().await.remove(&node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::health::HealthMonitor;
    use crate::store::{NodeStatus, NodeStore};

    struct Harness {
        store: Arc<NodeStore>,
        launcher: SimulatedLauncher,
        monitor: HealthMonitor,
        _shutdown: watch::Sender<bool>,
    }

    fn harness() -> Harness {
        let store = Arc::new(NodeStore::new());
        let registration = Arc::new(RegistrationHandler::new(
            Arc::clone(&store),
            Duration::from_secs(5),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Harness {
            launcher: SimulatedLauncher::new(registration, shutdown_rx),
            monitor: HealthMonitor::new(Arc::clone(&store), Duration::from_secs(15)),
            store,
            _shutdown: shutdown_tx,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_launched_node_stays_alive() {
        let h = harness();
        let registration = h.launcher.launch(4).await.unwrap();
        assert_eq!(registration.cpu_cores, 4);

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(6)).await;
            h.monitor.scan().await;
        }

        let node = h.store.node(registration.node_id).await.unwrap();
        assert_eq!(node.status, NodeStatus::Healthy);
        assert!(h.launcher.is_running(registration.node_id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminated_node_is_declared_dead_by_monitor() {
        let h = harness();
        let node_id = h.launcher.launch(4).await.unwrap().node_id;

        h.launcher.terminate(node_id).await.unwrap();
        assert!(!h.launcher.is_running(node_id).await);

        // Terminate alone does not kill the node.
        assert_eq!(
            h.store.node(node_id).await.unwrap().status,
            NodeStatus::Healthy
        );

        tokio::time::sleep(Duration::from_secs(16)).await;
        let stats = h.monitor.scan().await;
        assert_eq!(stats.nodes_marked_dead, 1);
        assert_eq!(h.store.node(node_id).await.unwrap().status, NodeStatus::Dead);
    }

    #[tokio::test]
    async fn test_terminate_unknown_node() {
        let h = harness();
        let node_id = NodeId::new();
        assert_eq!(
            h.launcher.terminate(node_id).await,
            Err(LaunchError::NotLaunched(node_id))
        );
    }

    #[tokio::test]
    async fn test_terminate_twice_fails_second_time() {
        let h = harness();
        let node_id = h.launcher.launch(2).await.unwrap().node_id;

        assert!(h.launcher.terminate(node_id).await.is_ok());
        assert_eq!(
            h.launcher.terminate(node_id).await,
            Err(LaunchError::NotLaunched(node_id))
        );
    }

    #[tokio::test]
    async fn test_launch_rejects_invalid_capacity() {
        let h = harness();
        assert_eq!(
            h.launcher.launch(-3).await.unwrap_err(),
            LaunchError::Registry(RegistryError::InvalidCapacity(-3))
        );
        assert!(h.store.list_nodes().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_exits_once_node_is_dead() {
        let h = harness();
        let node_id = h.launcher.launch(2).await.unwrap().node_id;
        h.store.mark_dead(node_id).await.unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!h.launcher.is_running(node_id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_stop_on_shutdown() {
        let store = Arc::new(NodeStore::new());
        let registration = Arc::new(RegistrationHandler::new(
            Arc::clone(&store),
            Duration::from_secs(5),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let launcher = SimulatedLauncher::new(registration, shutdown_rx);

        let node_id = launcher.launch(2).await.unwrap().node_id;
        shutdown_tx.send(true).unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!launcher.is_running(node_id).await);
    }
}
