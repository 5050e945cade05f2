//! # packd-id
//!
//! Typed identifiers for the packd cluster.
//!
//! Every identifier is system-generated at the moment the resource comes
//! into existence (a node at registration, a pod at placement) and never
//! changes afterwards. A node that dies and comes back gets a new `NodeId`.
//!
//! ## ID Format
//!
//! All IDs use a prefixed format: `{prefix}_{ulid}`
//!
//! Examples:
//! - `node_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `pod_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `req_01HV4Z4NYPLTRS0JTUA8XDME5F`
//!
//! The prefix keeps a pod id from ever being accepted where a node id is
//! expected, on the wire as well as in the type system.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
