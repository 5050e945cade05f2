//! API server client for the node agent.

use std::time::Duration;

use packd_id::NodeId;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors talking to the API server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{code} ({status}): {detail}")]
    Api {
        status: StatusCode,
        code: String,
        detail: String,
    },
}

impl ClientError {
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code.as_str()),
            ClientError::Http(_) => None,
        }
    }

    /// The server no longer accepts this node id; only a fresh
    /// registration brings it back.
    pub fn requires_reregistration(&self) -> bool {
        matches!(self.code(), Some("node_is_dead" | "node_not_found"))
    }

    /// Transport failures and server-side errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(_) => true,
            ClientError::Api { status, .. } => status.is_server_error(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RegisterRequest {
    cpu_cores: i64,
}

/// Response to a registration.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub node_id: NodeId,
    pub cpu_cores: u32,
    pub heartbeat_interval_secs: u64,
}

/// Response to a heartbeat.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatAck {
    pub accepted: bool,
    pub next_heartbeat_secs: u64,
}

#[derive(Debug, Deserialize)]
struct Problem {
    code: String,
    detail: String,
}

/// HTTP client for the node-facing API endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register this node, returning its assigned id.
    pub async fn register(&self, cpu_cores: i64) -> Result<Registration, ClientError> {
        let url = format!("{}/v1/nodes", self.base_url);
        debug!(url = %url, cpu_cores, "Registering node");

        let response = self
            .client
            .post(&url)
            .json(&RegisterRequest { cpu_cores })
            .send()
            .await?;

        Self::decode(response).await
    }

    /// Send a heartbeat for `node_id`.
    pub async fn heartbeat(&self, node_id: NodeId) -> Result<HeartbeatAck, ClientError> {
        let url = format!("{}/v1/nodes/{}/heartbeat", self.base_url, node_id);

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let (code, detail) = match serde_json::from_str::<Problem>(&body) {
            Ok(problem) => (problem.code, problem.detail),
            Err(_) => ("unknown".to_string(), body),
        };

        Err(ClientError::Api {
            status,
            code,
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn problem(status: u16, code: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_json(json!({
            "type": format!("https://packd.dev/problems/{code}"),
            "title": "Error",
            "status": status,
            "detail": "rejected",
            "code": code,
            "request_id": "req_test",
            "retryable": false,
        }))
    }

    #[tokio::test]
    async fn test_register_parses_response() {
        let server = MockServer::start().await;
        let node_id = NodeId::new();

        Mock::given(method("POST"))
            .and(path("/v1/nodes"))
            .and(body_json(json!({ "cpu_cores": 4 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "node_id": node_id,
                "cpu_cores": 4,
                "heartbeat_interval_secs": 5,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let registration = client.register(4).await.unwrap();

        assert_eq!(registration.node_id, node_id);
        assert_eq!(registration.heartbeat_interval_secs, 5);
    }

    #[tokio::test]
    async fn test_register_rejection_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/nodes"))
            .respond_with(problem(400, "invalid_capacity"))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let err = client.register(0).await.unwrap_err();

        assert_eq!(err.code(), Some("invalid_capacity"));
        assert!(!err.is_retryable());
        assert!(!err.requires_reregistration());
    }

    #[tokio::test]
    async fn test_dead_node_heartbeat_requires_reregistration() {
        let server = MockServer::start().await;
        let node_id = NodeId::new();

        Mock::given(method("POST"))
            .and(path(format!("/v1/nodes/{node_id}/heartbeat")))
            .respond_with(problem(410, "node_is_dead"))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let err = client.heartbeat(node_id).await.unwrap_err();

        assert!(err.requires_reregistration());
        assert!(matches!(err, ClientError::Api { status, .. } if status == StatusCode::GONE));
    }

    #[tokio::test]
    async fn test_non_problem_error_body() {
        let server = MockServer::start().await;
        let node_id = NodeId::new();

        Mock::given(method("POST"))
            .and(path(format!("/v1/nodes/{node_id}/heartbeat")))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let err = client.heartbeat(node_id).await.unwrap_err();

        assert_eq!(err.code(), Some("unknown"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        // Nothing listens on the discard port.
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        let err = client.heartbeat(NodeId::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Http(_)));
        assert!(err.is_retryable());
    }
}
