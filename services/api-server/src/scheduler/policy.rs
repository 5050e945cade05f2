//! Bin-packing placement policies.
//!
//! A policy looks at a snapshot of candidate nodes and names the one a pod
//! should go to. It never touches the store; the scheduler reserves on the
//! chosen node afterwards and reselects if that fails.

use std::cmp::Reverse;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::NodeSnapshot;

/// The placement policy used for every pod in a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementPolicy {
    /// First healthy node, in registration order, with enough room.
    #[default]
    FirstFit,
    /// Node left with the least room after placement.
    BestFit,
    /// Node left with the most room after placement.
    WorstFit,
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown placement policy '{0}' (expected first-fit, best-fit or worst-fit)")]
pub struct UnknownPolicy(pub String);

impl PlacementPolicy {
    pub const ALL: [PlacementPolicy; 3] = [
        PlacementPolicy::FirstFit,
        PlacementPolicy::BestFit,
        PlacementPolicy::WorstFit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementPolicy::FirstFit => "first-fit",
            PlacementPolicy::BestFit => "best-fit",
            PlacementPolicy::WorstFit => "worst-fit",
        }
    }

    /// Pick a node for a pod needing `required_cpu`.
    ///
    /// Only healthy candidates with `residual_cpu >= required_cpu` qualify.
    /// Ties between Best-Fit and Worst-Fit candidates go to the node
    /// registered first, so placement does not depend on candidate order.
    pub fn select<'a>(
        &self,
        candidates: &'a [NodeSnapshot],
        required_cpu: u32,
    ) -> Option<&'a NodeSnapshot> {
        let fitting = candidates
            .iter()
            .filter(|node| node.is_healthy() && node.residual_cpu() >= required_cpu);

        match self {
            PlacementPolicy::FirstFit => fitting.min_by_key(|node| node.registration_seq),
            PlacementPolicy::BestFit => fitting
                .min_by_key(|node| (node.residual_cpu() - required_cpu, node.registration_seq)),
            PlacementPolicy::WorstFit => fitting.max_by_key(|node| {
                (
                    node.residual_cpu() - required_cpu,
                    Reverse(node.registration_seq),
                )
            }),
        }
    }
}

impl std::fmt::Display for PlacementPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlacementPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "first-fit" => Ok(PlacementPolicy::FirstFit),
            "best-fit" => Ok(PlacementPolicy::BestFit),
            "worst-fit" => Ok(PlacementPolicy::WorstFit),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}
