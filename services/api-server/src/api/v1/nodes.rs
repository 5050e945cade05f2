//! Node API endpoints.
//!
//! Registration and heartbeats are called by node agents; listing and the
//! simulated-node endpoints are operator-facing.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use packd_id::{NodeId, PodId};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::registration::NodeRegistration;
use crate::state::AppState;
use crate::store::{NodeSnapshot, NodeStatus};

/// Create node routes, mounted under /v1.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/nodes", post(register_node).get(list_nodes))
        .route("/nodes/simulated", post(launch_simulated_node))
        .route("/nodes/{node_id}", get(get_node))
        .route("/nodes/{node_id}/heartbeat", post(heartbeat))
        .route("/nodes/{node_id}/terminate", post(terminate_node))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to register (or launch) a node.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterNodeRequest {
    /// CPU cores the node offers. Must be positive.
    pub cpu_cores: i64,
}

/// Response for a newly registered node.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterNodeResponse {
    pub node_id: NodeId,
    pub cpu_cores: u32,
    /// How often the node must heartbeat.
    pub heartbeat_interval_secs: u64,
}

impl From<NodeRegistration> for RegisterNodeResponse {
    fn from(registration: NodeRegistration) -> Self {
        Self {
            node_id: registration.node_id,
            cpu_cores: registration.cpu_cores,
            heartbeat_interval_secs: registration.heartbeat_interval.as_secs(),
        }
    }
}

/// Response for a single node.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeResponse {
    pub node_id: NodeId,
    pub total_cpu: u32,
    pub used_cpu: u32,
    pub available_cpu: u32,
    pub status: NodeStatus,
    /// Pods currently assigned. Always empty for dead nodes.
    pub pod_ids: Vec<PodId>,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl From<NodeSnapshot> for NodeResponse {
    fn from(node: NodeSnapshot) -> Self {
        Self {
            available_cpu: node.residual_cpu(),
            node_id: node.node_id,
            total_cpu: node.total_cpu,
            used_cpu: node.used_cpu,
            status: node.status,
            pod_ids: node.pod_ids,
            registered_at: node.registered_at,
            last_heartbeat_at: node.last_heartbeat_at,
        }
    }
}

/// Response for listing nodes, in registration order.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListNodesResponse {
    pub items: Vec<NodeResponse>,
}

/// Response for heartbeat.
#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub accepted: bool,
    pub next_heartbeat_secs: u64,
}

/// Response for terminating a simulated node.
#[derive(Debug, Serialize, Deserialize)]
pub struct TerminateNodeResponse {
    pub node_id: NodeId,
    pub terminated: bool,
}

// =============================================================================
// Handlers
// =============================================================================

fn parse_node_id(raw: &str, request_id: &str) -> Result<NodeId, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::bad_request("invalid_node_id", format!("Invalid node ID format: {raw}"))
            .with_request_id(request_id.to_string())
    })
}

/// Register a node.
///
/// POST /v1/nodes
async fn register_node(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<RegisterNodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let registration = state
        .registration()
        .register_node(req.cpu_cores)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterNodeResponse::from(registration)),
    ))
}

/// List every node, dead ones included.
///
/// GET /v1/nodes
async fn list_nodes(State(state): State<AppState>) -> impl IntoResponse {
    let items = state
        .store()
        .list_nodes()
        .await
        .into_iter()
        .map(NodeResponse::from)
        .collect();

    Json(ListNodesResponse { items })
}

/// Get a node by ID.
///
/// GET /v1/nodes/{node_id}
async fn get_node(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;
    let node_id = parse_node_id(&node_id, &request_id)?;

    let node = state
        .store()
        .node(node_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id))?;

    Ok(Json(NodeResponse::from(node)))
}

/// Record a heartbeat.
///
/// POST /v1/nodes/{node_id}/heartbeat
async fn heartbeat(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;
    let node_id = parse_node_id(&node_id, &request_id)?;

    let ack = state
        .registration()
        .heartbeat(node_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id))?;

    Ok(Json(HeartbeatResponse {
        accepted: true,
        next_heartbeat_secs: ack.next_heartbeat.as_secs(),
    }))
}

/// Launch a simulated node that heartbeats from inside the server.
///
/// POST /v1/nodes/simulated
async fn launch_simulated_node(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<RegisterNodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let registration = state
        .launcher()
        .launch(req.cpu_cores)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterNodeResponse::from(registration)),
    ))
}

/// Stop a simulated node's heartbeats. The node is declared dead by the
/// health monitor once its deadline passes.
///
/// POST /v1/nodes/{node_id}/terminate
async fn terminate_node(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;
    let node_id = parse_node_id(&node_id, &request_id)?;

    state
        .launcher()
        .terminate(node_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id))?;

    Ok(Json(TerminateNodeResponse {
        node_id,
        terminated: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_response_from_snapshot() {
        let now = Utc::now();
        let pod_id = PodId::new();
        let snapshot = NodeSnapshot {
            node_id: NodeId::new(),
            registration_seq: 0,
            total_cpu: 8,
            used_cpu: 3,
            status: NodeStatus::Healthy,
            pod_ids: vec![pod_id],
            registered_at: now,
            last_heartbeat_at: now,
        };

        let json = serde_json::to_value(NodeResponse::from(snapshot)).unwrap();
        assert_eq!(json["available_cpu"], 5);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["pod_ids"][0], pod_id.to_string());
    }

    #[test]
    fn test_register_request_accepts_negative_cores() {
        // Validation belongs to the registry, not the decoder.
        let req: RegisterNodeRequest = serde_json::from_str(r#"{"cpu_cores": -2}"#).unwrap();
        assert_eq!(req.cpu_cores, -2);
    }
}
