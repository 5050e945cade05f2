//! Pod API endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use packd_id::{NodeId, PodId};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::scheduler::{Placement, PlacementPolicy};
use crate::state::AppState;
use crate::store::{PodRecord, PodStatus};

pub fn routes() -> Router<AppState> {
    Router::new().route("/pods", post(create_pod).get(list_pods))
}

/// Request to place a pod.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePodRequest {
    /// CPU the pod needs. Must be positive.
    pub cpu_requirement: i64,
}

/// Where a new pod was placed.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePodResponse {
    pub pod_id: PodId,
    pub node_id: NodeId,
    pub cpu_requirement: u32,
    pub policy: PlacementPolicy,
}

impl From<Placement> for CreatePodResponse {
    fn from(placement: Placement) -> Self {
        Self {
            pod_id: placement.pod_id,
            node_id: placement.node_id,
            cpu_requirement: placement.cpu_requirement,
            policy: placement.policy,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PodResponse {
    pub pod_id: PodId,
    pub cpu_requirement: u32,
    /// Null once the pod is orphaned.
    pub node_id: Option<NodeId>,
    pub status: PodStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub orphaned_from: Option<NodeId>,
    pub created_at: DateTime<Utc>,
}

impl From<PodRecord> for PodResponse {
    fn from(pod: PodRecord) -> Self {
        Self {
            pod_id: pod.pod_id,
            cpu_requirement: pod.cpu_requirement,
            node_id: pod.node_id,
            status: pod.status,
            orphaned_from: pod.orphaned_from,
            created_at: pod.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListPodsResponse {
    pub items: Vec<PodResponse>,
}

/// Place a pod on a healthy node.
///
/// POST /v1/pods
async fn create_pod(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<CreatePodRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let placement = state
        .scheduler()
        .place_pod(req.cpu_requirement)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok((StatusCode::CREATED, Json(CreatePodResponse::from(placement))))
}

/// List pods, running and orphaned.
///
/// GET /v1/pods
async fn list_pods(State(state): State<AppState>) -> impl IntoResponse {
    let items = state
        .store()
        .list_pods()
        .await
        .into_iter()
        .map(PodResponse::from)
        .collect();

    Json(ListPodsResponse { items })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_pod_omits_orphaned_from() {
        let pod = PodResponse {
            pod_id: PodId::new(),
            cpu_requirement: 2,
            node_id: Some(NodeId::new()),
            status: PodStatus::Running,
            orphaned_from: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&pod).unwrap();
        assert!(json.get("orphaned_from").is_none());
        assert_eq!(json["status"], "running");
    }

    #[test]
    fn test_orphaned_pod_has_null_node() {
        let host = NodeId::new();
        let pod = PodResponse {
            pod_id: PodId::new(),
            cpu_requirement: 2,
            node_id: None,
            status: PodStatus::Orphaned,
            orphaned_from: Some(host),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&pod).unwrap();
        assert!(json["node_id"].is_null());
        assert_eq!(json["orphaned_from"], host.to_string());
    }
}
