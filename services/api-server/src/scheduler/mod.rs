//! Pod scheduler.
//!
//! The scheduler is responsible for:
//! - Validating a pod's CPU requirement
//! - Choosing a live node under the deployment's placement policy
//! - Reserving capacity on that node, reselecting when the reservation
//!   loses a race

mod placer;
mod policy;

pub use placer::{Placement, PodScheduler, SchedulerError, SchedulerResult};
pub use policy::{PlacementPolicy, UnknownPolicy};
