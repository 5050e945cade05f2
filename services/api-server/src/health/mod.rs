//! Heartbeat-based node health monitoring.
//!
//! The monitor wakes on a fixed period, snapshots the node ids, and judges
//! each node on its own. A node silent for longer than the heartbeat
//! timeout is marked dead; its capacity is reclaimed and its pods are
//! orphaned (never rescheduled).

mod monitor;
mod worker;

pub use monitor::{HealthMonitor, ScanStats};
pub use worker::HealthWorker;
