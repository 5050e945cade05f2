//! packd node agent library.
//!
//! A node agent announces a machine's CPU capacity to the API server and
//! then heartbeats on the interval the server advertises. If the server
//! has declared the node dead, the agent rejoins under a new identity.

pub mod agent;
pub mod client;
pub mod config;

pub use agent::NodeAgent;
pub use client::{ApiClient, ClientError};
