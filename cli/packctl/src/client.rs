//! HTTP client for API communication.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::CliError;

/// API client for communicating with the packd API server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let response = self.client.get(self.url(path)).send().await?;

        self.handle_response(response).await
    }

    /// Make a POST request with a JSON body.
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CliError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;

        self.handle_response(response).await
    }

    /// Make a POST request without a body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let response = self.client.post(self.url(path)).send().await?;

        self.handle_response(response).await
    }

    /// Handle a successful or error response.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CliError> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to parse response: {}", e)))
        } else {
            self.handle_error(response).await
        }
    }

    /// Handle an error response.
    async fn handle_error<T>(&self, response: reqwest::Response) -> Result<T, CliError> {
        let status = response.status();

        let error_body: ApiErrorResponse =
            response.json().await.unwrap_or_else(|_| ApiErrorResponse {
                code: "unknown".to_string(),
                detail: status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string(),
                request_id: None,
            });

        Err(CliError::api(
            status.as_u16(),
            error_body.code,
            error_body.detail,
            error_body.request_id,
        ))
    }
}

/// Problem details returned by the API server.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: String,
    detail: String,
    #[serde(default)]
    request_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_building() {
        let client = ApiClient::new("http://127.0.0.1:5001/").unwrap();
        assert_eq!(client.url("/v1/nodes"), "http://127.0.0.1:5001/v1/nodes");
    }

    #[tokio::test]
    async fn test_problem_details_become_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pods"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "type": "https://packd.dev/problems/no_capacity_available",
                "title": "Service Unavailable",
                "status": 503,
                "detail": "no healthy node has 4 CPU available",
                "code": "no_capacity_available",
                "request_id": "req_abc",
                "retryable": true,
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let err = client
            .post::<serde_json::Value, _>("/v1/pods", &json!({ "cpu_requirement": 4 }))
            .await
            .unwrap_err();

        match err {
            CliError::Api {
                status,
                code,
                request_id,
                ..
            } => {
                assert_eq!(status, 503);
                assert_eq!(code, "no_capacity_available");
                assert_eq!(request_id.as_deref(), Some("req_abc"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/stats"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let err = client.get::<serde_json::Value>("/v1/stats").await.unwrap_err();
        assert!(matches!(err, CliError::Api { status: 500, ref code, .. } if code == "unknown"));
    }
}
