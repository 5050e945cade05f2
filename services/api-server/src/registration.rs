//! Node registration and heartbeat handling.
//!
//! The single entry point through which nodes join the cluster and keep
//! their dead-man's switch reset. Everything here is a thin pass-through
//! to the store; the heartbeat interval is what nodes are told to use.

use std::sync::Arc;
use std::time::Duration;

use packd_id::NodeId;
use tracing::{debug, info};

use crate::store::{NodeStore, RegistryResult};

/// A node that was just admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRegistration {
    pub node_id: NodeId,
    pub cpu_cores: u32,
    pub heartbeat_interval: Duration,
}

/// Acknowledgement of an accepted heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatAck {
    pub next_heartbeat: Duration,
}

/// Admits nodes and records their heartbeats.
pub struct RegistrationHandler {
    store: Arc<NodeStore>,
    heartbeat_interval: Duration,
}

impl RegistrationHandler {
    pub fn new(store: Arc<NodeStore>, heartbeat_interval: Duration) -> Self {
        Self {
            store,
            heartbeat_interval,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Register a node declaring `cpu_cores` of capacity.
    pub async fn register_node(&self, cpu_cores: i64) -> RegistryResult<NodeRegistration> {
        let node_id = self.store.register(cpu_cores).await?;
        let node = self.store.node(node_id).await?;

        info!(node_id = %node_id, cpu_cores = node.total_cpu, "Node registered");

        Ok(NodeRegistration {
            node_id,
            cpu_cores: node.total_cpu,
            heartbeat_interval: self.heartbeat_interval,
        })
    }

    /// Record a heartbeat from `node_id`.
    pub async fn heartbeat(&self, node_id: NodeId) -> RegistryResult<HeartbeatAck> {
        self.store.heartbeat(node_id).await?;
        debug!(node_id = %node_id, "Heartbeat received");

        Ok(HeartbeatAck {
            next_heartbeat: self.heartbeat_interval,
        })
    }
}
