//! Cluster statistics.

use std::collections::BTreeMap;

use packd_id::NodeId;
use serde::{Deserialize, Serialize};

use crate::store::{NodeSnapshot, NodeStore, PodRecord, PodStatus};

/// Point-in-time view of the whole cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub nodes: NodeStats,
    pub pods: PodStats,
}

/// Node counts and CPU totals. CPU figures cover healthy nodes only.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub dead_nodes: usize,
    pub total_cpu: u64,
    pub used_cpu: u64,
    pub available_cpu: u64,
}

/// Pod counts.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStats {
    pub total_pods: usize,
    pub running_pods: usize,
    pub orphaned_pods: usize,
    /// CPU requested by running pods.
    pub total_cpu_requested: u64,
    /// Running pods per healthy node, nodes without pods included.
    pub pods_per_node: BTreeMap<NodeId, usize>,
}

impl ClusterStats {
    /// Compute statistics from snapshots.
    pub fn compute(nodes: &[NodeSnapshot], pods: &[PodRecord]) -> Self {
        let mut node_stats = NodeStats {
            total_nodes: nodes.len(),
            ..Default::default()
        };
        let mut pod_stats = PodStats {
            total_pods: pods.len(),
            ..Default::default()
        };

        for node in nodes {
            if !node.is_healthy() {
                node_stats.dead_nodes += 1;
                continue;
            }
            node_stats.healthy_nodes += 1;
            node_stats.total_cpu += u64::from(node.total_cpu);
            node_stats.used_cpu += u64::from(node.used_cpu);
            node_stats.available_cpu += u64::from(node.residual_cpu());
            pod_stats
                .pods_per_node
                .insert(node.node_id, node.pod_ids.len());
        }

        for pod in pods {
            match pod.status {
                PodStatus::Running => {
                    pod_stats.running_pods += 1;
                    pod_stats.total_cpu_requested += u64::from(pod.cpu_requirement);
                }
                PodStatus::Orphaned => pod_stats.orphaned_pods += 1,
            }
        }

        Self {
            nodes: node_stats,
            pods: pod_stats,
        }
    }

    /// Collect statistics from the store.
    pub async fn collect(store: &NodeStore) -> Self {
        let nodes = store.list_nodes().await;
        let pods = store.list_pods().await;
        Self::compute(&nodes, &pods)
    }
}
