//! Error types for the node record store.

use packd_id::{NodeId, PodId};

/// Result type for store operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised by the node record store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid capacity {0}: total CPU must be a positive integer")]
    InvalidCapacity(i64),

    #[error("invalid CPU request {0}: required CPU must be a positive integer")]
    InvalidCpuRequest(i64),

    #[error("node {0} not found")]
    UnknownNode(NodeId),

    #[error("node {0} is dead")]
    NodeIsDead(NodeId),

    #[error("node {node_id} has {residual} CPU free but {requested} was requested")]
    CapacityExceeded {
        node_id: NodeId,
        requested: u32,
        residual: u32,
    },

    #[error("pod {0} is already placed")]
    DuplicatePod(PodId),
}

impl RegistryError {
    /// Whether a placement that hit this error should reselect and retry.
    ///
    /// The scheduler's snapshot can go stale between selection and
    /// reservation; these two kinds are exactly the ways it goes stale.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::CapacityExceeded { .. } | RegistryError::NodeIsDead(_)
        )
    }
}
