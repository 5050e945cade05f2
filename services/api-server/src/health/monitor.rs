//! A single health scan.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::store::NodeStore;

/// Outcome of one scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub nodes_checked: usize,
    pub nodes_marked_dead: usize,
    pub pods_orphaned: usize,
    pub nodes_skipped: usize,
}

/// Judges node liveness against a heartbeat timeout.
pub struct HealthMonitor {
    store: Arc<NodeStore>,
    heartbeat_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(store: Arc<NodeStore>, heartbeat_timeout: Duration) -> Self {
        Self {
            store,
            heartbeat_timeout,
        }
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Scan every node as of now.
    pub async fn scan(&self) -> ScanStats {
        self.scan_at(Instant::now()).await
    }

    /// Scan every node as of `now`.
    ///
    /// No lock is held across nodes: each one is evaluated under its own
    /// record lock, so registrations, heartbeats and placements interleave
    /// freely with the scan.
    pub async fn scan_at(&self, now: Instant) -> ScanStats {
        let mut stats = ScanStats::default();

        for node_id in self.store.node_ids().await {
            stats.nodes_checked += 1;

            let released = match self
                .store
                .mark_dead_if_stale(node_id, now, self.heartbeat_timeout)
                .await
            {
                Ok(Some(released)) => released,
                Ok(None) => continue,
                Err(e) => {
                    warn!(node_id = %node_id, error = %e, "Failed to evaluate node, skipping");
                    stats.nodes_skipped += 1;
                    continue;
                }
            };

            stats.nodes_marked_dead += 1;
            warn!(
                node_id = %node_id,
                released_pods = released.len(),
                timeout_secs = self.heartbeat_timeout.as_secs(),
                "Node missed heartbeats, marked dead"
            );

            let orphaned = self.store.orphan_pods(node_id, &released).await;
            stats.pods_orphaned += orphaned;
            if orphaned > 0 {
                warn!(node_id = %node_id, orphaned, "Pods orphaned by dead node");
            }
        }

        debug!(
            nodes_checked = stats.nodes_checked,
            nodes_marked_dead = stats.nodes_marked_dead,
            pods_orphaned = stats.pods_orphaned,
            "Health scan complete"
        );

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packd_id::PodId;

    use crate::store::{NodeStatus, PodStatus};

    const TIMEOUT: Duration = Duration::from_secs(15);

    #[tokio::test]
    async fn test_scan_empty_store() {
        let monitor = HealthMonitor::new(Arc::new(NodeStore::new()), TIMEOUT);
        assert_eq!(monitor.scan().await, ScanStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_nodes_survive() {
        let store = Arc::new(NodeStore::new());
        store.register(4).await.unwrap();
        store.register(8).await.unwrap();

        let monitor = HealthMonitor::new(Arc::clone(&store), TIMEOUT);
        let stats = monitor.scan().await;

        assert_eq!(stats.nodes_checked, 2);
        assert_eq!(stats.nodes_marked_dead, 0);
        assert_eq!(store.live_nodes().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_node_is_reclaimed() {
        let store = Arc::new(NodeStore::new());
        let silent = store.register(10).await.unwrap();
        let chatty = store.register(10).await.unwrap();

        let p1 = PodId::new();
        let p2 = PodId::new();
        let p3 = PodId::new();
        store.reserve(silent, p1, 3).await.unwrap();
        store.reserve(silent, p2, 4).await.unwrap();
        store.reserve(chatty, p3, 5).await.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        store.heartbeat(chatty).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        let monitor = HealthMonitor::new(Arc::clone(&store), TIMEOUT);
        let stats = monitor.scan().await;

        assert_eq!(stats.nodes_marked_dead, 1);
        assert_eq!(stats.pods_orphaned, 2);

        let dead = store.node(silent).await.unwrap();
        assert_eq!(dead.status, NodeStatus::Dead);
        assert_eq!(dead.used_cpu, 0);
        assert!(dead.pod_ids.is_empty());

        let alive = store.node(chatty).await.unwrap();
        assert_eq!(alive.status, NodeStatus::Healthy);
        assert_eq!(alive.used_cpu, 5);
        assert_eq!(alive.pod_ids, vec![p3]);

        for pod_id in [p1, p2] {
            let pod = store.pod(pod_id).await.unwrap();
            assert_eq!(pod.status, PodStatus::Orphaned);
            assert_eq!(pod.node_id, None);
            assert_eq!(pod.orphaned_from, Some(silent));
        }
        assert_eq!(
            store.pod(p3).await.unwrap().status,
            PodStatus::Running
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_nodes_are_not_reprocessed() {
        let store = Arc::new(NodeStore::new());
        store.register(2).await.unwrap();

        let monitor = HealthMonitor::new(Arc::clone(&store), TIMEOUT);
        tokio::time::advance(TIMEOUT + Duration::from_secs(1)).await;

        assert_eq!(monitor.scan().await.nodes_marked_dead, 1);
        let second = monitor.scan().await;
        assert_eq!(second.nodes_checked, 1);
        assert_eq!(second.nodes_marked_dead, 0);
        assert_eq!(second.nodes_skipped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_at_explicit_instant() {
        let store = Arc::new(NodeStore::new());
        let node_id = store.register(2).await.unwrap();
        let monitor = HealthMonitor::new(Arc::clone(&store), TIMEOUT);

        let now = Instant::now();
        assert_eq!(monitor.scan_at(now + TIMEOUT).await.nodes_marked_dead, 0);
        assert_eq!(
            monitor
                .scan_at(now + TIMEOUT + Duration::from_millis(1))
                .await
                .nodes_marked_dead,
            1
        );
        assert_eq!(
            store.heartbeat(node_id).await,
            Err(crate::store::RegistryError::NodeIsDead(node_id))
        );
    }
}
