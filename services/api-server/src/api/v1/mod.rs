//! API v1 routes.

pub mod nodes;
pub mod pods;
mod stats;

use axum::Router;

use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(nodes::routes())
        .merge(pods::routes())
        .merge(stats::routes())
}
