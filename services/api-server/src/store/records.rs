//! Record and snapshot types held by the store.

use chrono::{DateTime, Utc};
use packd_id::{NodeId, PodId};
use serde::{Deserialize, Serialize};

/// Health status of a node.
///
/// `Healthy` on registration. `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Healthy,
    Dead,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Healthy => "healthy",
            NodeStatus::Dead => "dead",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodStatus {
    /// Assigned to a live node.
    Running,
    /// Its node was marked dead. Orphans are never rescheduled.
    Orphaned,
}

impl PodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodStatus::Running => "running",
            PodStatus::Orphaned => "orphaned",
        }
    }
}

impl std::fmt::Display for PodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of a node record.
///
/// Taken under the record's lock, so `used_cpu` and `pod_ids` always agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub node_id: NodeId,
    /// Position in registration order, starting at 0.
    pub registration_seq: u64,
    pub total_cpu: u32,
    pub used_cpu: u32,
    pub status: NodeStatus,
    /// Pods on this node, ordered by pod id.
    pub pod_ids: Vec<PodId>,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl NodeSnapshot {
    /// CPU still available for placement.
    pub fn residual_cpu(&self) -> u32 {
        self.total_cpu - self.used_cpu
    }

    pub fn is_healthy(&self) -> bool {
        self.status == NodeStatus::Healthy
    }
}

/// The store's record of a placed pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRecord {
    pub pod_id: PodId,
    pub cpu_requirement: u32,
    /// Hosting node; cleared when the pod is orphaned.
    pub node_id: Option<NodeId>,
    pub status: PodStatus,
    /// The node this pod was lost with, kept for listing.
    pub orphaned_from: Option<NodeId>,
    pub created_at: DateTime<Utc>,
}

impl PodRecord {
    pub(crate) fn running(pod_id: PodId, node_id: NodeId, cpu_requirement: u32) -> Self {
        Self {
            pod_id,
            cpu_requirement,
            node_id: Some(node_id),
            status: PodStatus::Running,
            orphaned_from: None,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn orphan(&mut self) {
        self.orphaned_from = self.node_id.take();
        self.status = PodStatus::Orphaned;
    }
}
