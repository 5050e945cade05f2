//! Cluster statistics endpoint.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};

use crate::state::AppState;
use crate::stats::ClusterStats;

pub fn routes() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}

/// GET /v1/stats
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ClusterStats::collect(state.store()).await)
}
