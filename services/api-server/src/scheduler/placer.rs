//! Pod placement with retry-on-conflict.
//!
//! Selection runs on a snapshot, so by the time the scheduler reserves, the
//! chosen node may have filled up or died. `reserve` re-checks both under
//! the node's lock; when it refuses, the scheduler re-reads the live set and
//! selects again, up to `max_retries` times.

use std::future::{ready, Future};
use std::sync::Arc;

use packd_id::{NodeId, PodId};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::policy::PlacementPolicy;
use crate::store::{NodeStore, RegistryError};

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors that can occur during placement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid CPU request {0}: required CPU must be a positive integer")]
    InvalidCpuRequest(i64),

    #[error("no healthy node has {requested} CPU available")]
    NoCapacityAvailable { requested: u32 },

    #[error("placement of {requested} CPU gave up after {attempts} conflicting attempts")]
    RetryExhausted { requested: u32, attempts: u32 },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SchedulerError {
    /// Whether the client should see this as "no capacity".
    pub fn is_no_capacity(&self) -> bool {
        matches!(
            self,
            SchedulerError::NoCapacityAvailable { .. } | SchedulerError::RetryExhausted { .. }
        )
    }
}

/// A successful placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub pod_id: PodId,
    pub node_id: NodeId,
    pub cpu_requirement: u32,
    pub policy: PlacementPolicy,
    /// Selection rounds it took, 1 when there was no conflict.
    pub attempts: u32,
}

/// Places pods onto live nodes under a fixed policy.
pub struct PodScheduler {
    store: Arc<NodeStore>,
    policy: PlacementPolicy,
    max_retries: u32,
}

impl PodScheduler {
    /// Default number of reselections after a conflicting reservation.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Create a scheduler over `store`.
    pub fn new(store: Arc<NodeStore>, policy: PlacementPolicy, max_retries: u32) -> Self {
        Self {
            store,
            policy,
            max_retries,
        }
    }

    pub fn policy(&self) -> PlacementPolicy {
        self.policy
    }

    /// Place a new pod needing `required_cpu`.
    #[instrument(skip(self), fields(policy = %self.policy))]
    pub async fn place_pod(&self, required_cpu: i64) -> SchedulerResult<Placement> {
        self.place_with(required_cpu, |_| ready(())).await
    }

    /// Placement loop. `before_reserve` runs after each selection and
    /// before the reservation of the chosen node.
    async fn place_with<F, Fut>(
        &self,
        required_cpu: i64,
        mut before_reserve: F,
    ) -> SchedulerResult<Placement>
    where
        F: FnMut(NodeId) -> Fut,
        Fut: Future<Output = ()>,
    {
        let cpu = u32::try_from(required_cpu)
            .ok()
            .filter(|cpu| *cpu > 0)
            .ok_or(SchedulerError::InvalidCpuRequest(required_cpu))?;

        let pod_id = PodId::new();
        let attempts = self.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let candidates = self.store.live_nodes().await;

            let Some(target) = self.policy.select(&candidates, cpu) else {
                info!(
                    requested = cpu,
                    healthy_nodes = candidates.len(),
                    "No healthy node can fit pod"
                );
                return Err(SchedulerError::NoCapacityAvailable { requested: cpu });
            };
            let node_id = target.node_id;
            before_reserve(node_id).await;

            match self.store.reserve(node_id, pod_id, cpu).await {
                Ok(()) => {
                    info!(
                        pod_id = %pod_id,
                        node_id = %node_id,
                        cpu,
                        attempt,
                        "Pod placed"
                    );
                    return Ok(Placement {
                        pod_id,
                        node_id,
                        cpu_requirement: cpu,
                        policy: self.policy,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_transient() => {
                    debug!(
                        pod_id = %pod_id,
                        node_id = %node_id,
                        attempt,
                        error = %e,
                        "Reservation lost a race, reselecting"
                    );
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            pod_id = %pod_id,
            requested = cpu,
            attempts,
            "Placement retries exhausted"
        );
        Err(SchedulerError::RetryExhausted {
            requested: cpu,
            attempts,
        })
    }
}
