//! Node record store.
//!
//! The store owns every node record and every pod record. It exposes a
//! small set of atomic operations (`register`, `heartbeat`, `reserve`,
//! `mark_dead`) which are the only way to mutate a record.
//!
//! ## Locking
//!
//! - The directory (registration order + id index) sits behind one
//!   `RwLock`. It is held only long enough to append a record or clone
//!   the `Arc` handles out of it, never while a record is locked.
//! - Each node record has its own `Mutex`. All mutation of a node's
//!   capacity, pod set, status and heartbeat time happens under it.
//! - The pod table has its own `RwLock`. When both are needed, the node
//!   lock is taken first. Nothing takes them in the opposite order.
//!   `reserve` holds the pod table's write lock for the insert, so
//!   reservations on different nodes serialize for that step only; their
//!   capacity checks still run in parallel under separate node locks.

mod error;
mod records;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use packd_id::{NodeId, PodId};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

pub use error::{RegistryError, RegistryResult};
pub use records::{NodeSnapshot, NodeStatus, PodRecord, PodStatus};

/// The authoritative in-memory registry of nodes and pods.
#[derive(Default)]
pub struct NodeStore {
    directory: RwLock<Directory>,
    pods: RwLock<HashMap<PodId, PodRecord>>,
}

#[derive(Default)]
struct Directory {
    /// Append-only; records are never removed.
    order: Vec<Arc<NodeEntry>>,
    by_id: HashMap<NodeId, Arc<NodeEntry>>,
}

struct NodeEntry {
    id: NodeId,
    seq: u64,
    total_cpu: u32,
    registered_at: DateTime<Utc>,
    state: Mutex<NodeState>,
}

struct NodeState {
    status: NodeStatus,
    used_cpu: u32,
    /// pod id -> reserved CPU
    pods: BTreeMap<PodId, u32>,
    last_heartbeat: Instant,
    last_heartbeat_at: DateTime<Utc>,
}

impl NodeState {
    /// Flip to dead and release everything the node held.
    fn kill(&mut self) -> Vec<PodId> {
        self.status = NodeStatus::Dead;
        self.used_cpu = 0;
        std::mem::take(&mut self.pods).into_keys().collect()
    }
}

impl NodeEntry {
    async fn snapshot(&self) -> NodeSnapshot {
        let state = self.state.lock().await;
        NodeSnapshot {
            node_id: self.id,
            registration_seq: self.seq,
            total_cpu: self.total_cpu,
            used_cpu: state.used_cpu,
            status: state.status,
            pod_ids: state.pods.keys().copied().collect(),
            registered_at: self.registered_at,
            last_heartbeat_at: state.last_heartbeat_at,
        }
    }
}

impl NodeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new node with `total_cpu` capacity.
    ///
    /// The record starts healthy, empty, and with a fresh heartbeat.
    pub async fn register(&self, total_cpu: i64) -> RegistryResult<NodeId> {
        let capacity = u32::try_from(total_cpu)
            .ok()
            .filter(|cpu| *cpu > 0)
            .ok_or(RegistryError::InvalidCapacity(total_cpu))?;

        let node_id = NodeId::new();
        let now = Utc::now();

        let mut directory = self.directory.write().await;
        let entry = Arc::new(NodeEntry {
            id: node_id,
            seq: directory.order.len() as u64,
            total_cpu: capacity,
            registered_at: now,
            state: Mutex::new(NodeState {
                status: NodeStatus::Healthy,
                used_cpu: 0,
                pods: BTreeMap::new(),
                last_heartbeat: Instant::now(),
                last_heartbeat_at: now,
            }),
        });
        directory.by_id.insert(node_id, Arc::clone(&entry));
        directory.order.push(entry);

        Ok(node_id)
    }

    /// Refresh a node's last-heartbeat time.
    ///
    /// Dead nodes stay dead: their heartbeats are rejected.
    pub async fn heartbeat(&self, node_id: NodeId) -> RegistryResult<()> {
        let entry = self.entry(node_id).await?;
        let mut state = entry.state.lock().await;

        if state.status == NodeStatus::Dead {
            return Err(RegistryError::NodeIsDead(node_id));
        }

        state.last_heartbeat = Instant::now();
        state.last_heartbeat_at = Utc::now();
        Ok(())
    }

    /// Atomically reserve `cpu` on a node for `pod_id`.
    ///
    /// Capacity and liveness are re-validated here, under the node's lock,
    /// whatever the caller saw when it picked the node. On success the pod
    /// record is created before the lock is released.
    pub async fn reserve(&self, node_id: NodeId, pod_id: PodId, cpu: u32) -> RegistryResult<()> {
        if cpu == 0 {
            return Err(RegistryError::InvalidCpuRequest(0));
        }

        let entry = self.entry(node_id).await?;
        let mut state = entry.state.lock().await;

        if state.status == NodeStatus::Dead {
            return Err(RegistryError::NodeIsDead(node_id));
        }

        let residual = entry.total_cpu - state.used_cpu;
        if cpu > residual {
            return Err(RegistryError::CapacityExceeded {
                node_id,
                requested: cpu,
                residual,
            });
        }

        let mut pods = self.pods.write().await;
        if pods.contains_key(&pod_id) {
            return Err(RegistryError::DuplicatePod(pod_id));
        }

        state.used_cpu += cpu;
        state.pods.insert(pod_id, cpu);
        pods.insert(pod_id, PodRecord::running(pod_id, node_id, cpu));

        Ok(())
    }

    /// Atomically mark a node dead, returning the pods it was running.
    ///
    /// The node's capacity is reclaimed immediately. The returned pods
    /// still need [`NodeStore::orphan_pods`].
    pub async fn mark_dead(&self, node_id: NodeId) -> RegistryResult<Vec<PodId>> {
        let entry = self.entry(node_id).await?;
        let mut state = entry.state.lock().await;

        if state.status == NodeStatus::Dead {
            return Err(RegistryError::NodeIsDead(node_id));
        }

        Ok(state.kill())
    }

    /// Mark a node dead only if it has been silent for longer than `timeout`
    /// as of `now`.
    ///
    /// Staleness is decided under the record's lock, so a heartbeat that
    /// lands while the monitor is mid-scan always wins. Returns `None` when
    /// the node is alive or already dead.
    pub async fn mark_dead_if_stale(
        &self,
        node_id: NodeId,
        now: Instant,
        timeout: Duration,
    ) -> RegistryResult<Option<Vec<PodId>>> {
        let entry = self.entry(node_id).await?;
        let mut state = entry.state.lock().await;

        if state.status == NodeStatus::Dead {
            return Ok(None);
        }

        let silent_for = now.saturating_duration_since(state.last_heartbeat);
        if silent_for <= timeout {
            return Ok(None);
        }

        debug!(
            node_id = %node_id,
            silent_ms = silent_for.as_millis() as u64,
            timeout_ms = timeout.as_millis() as u64,
            "Heartbeat deadline passed"
        );
        Ok(Some(state.kill()))
    }

    /// Mark pods released by a dead node as orphaned.
    ///
    /// Only pods still assigned to `node_id` are touched. Returns how many
    /// were orphaned.
    pub async fn orphan_pods(&self, node_id: NodeId, pod_ids: &[PodId]) -> usize {
        let mut pods = self.pods.write().await;
        let mut orphaned = 0;

        for pod_id in pod_ids {
            if let Some(record) = pods.get_mut(pod_id) {
                if record.node_id == Some(node_id) {
                    record.orphan();
                    orphaned += 1;
                }
            }
        }

        orphaned
    }

    /// Snapshot every node, in registration order.
    pub async fn list_nodes(&self) -> Vec<NodeSnapshot> {
        let entries = self.entries().await;
        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            snapshots.push(entry.snapshot().await);
        }
        snapshots
    }

    /// Snapshot the healthy nodes, in registration order.
    pub async fn live_nodes(&self) -> Vec<NodeSnapshot> {
        let mut nodes = self.list_nodes().await;
        nodes.retain(NodeSnapshot::is_healthy);
        nodes
    }

    /// Snapshot a single node.
    pub async fn node(&self, node_id: NodeId) -> RegistryResult<NodeSnapshot> {
        Ok(self.entry(node_id).await?.snapshot().await)
    }

    /// Every known node id, in registration order.
    pub async fn node_ids(&self) -> Vec<NodeId> {
        let directory = self.directory.read().await;
        directory.order.iter().map(|entry| entry.id).collect()
    }

    /// Snapshot every pod record, oldest first.
    pub async fn list_pods(&self) -> Vec<PodRecord> {
        let mut pods: Vec<PodRecord> = self.pods.read().await.values().cloned().collect();
        pods.sort_by_key(|pod| (pod.created_at, pod.pod_id));
        pods
    }

    /// Look up a single pod record.
    pub async fn pod(&self, pod_id: PodId) -> Option<PodRecord> {
        self.pods.read().await.get(&pod_id).cloned()
    }

    async fn entry(&self, node_id: NodeId) -> RegistryResult<Arc<NodeEntry>> {
        self.directory
            .read()
            .await
            .by_id
            .get(&node_id)
            .cloned()
            .ok_or(RegistryError::UnknownNode(node_id))
    }

    async fn entries(&self) -> Vec<Arc<NodeEntry>> {
        self.directory.read().await.order.clone()
    }
}
