//! packd API server library.
//!
//! This crate primarily ships an `api-server` binary, but we expose a small
//! library surface to enable integration testing and reuse.

pub mod api;
pub mod config;
pub mod health;
pub mod launcher;
pub mod registration;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod store;
