//! Shared harness for API integration tests.

#![allow(dead_code)]

use std::time::Duration;

use packd_api_server::{api, config::ClusterConfig, health::ScanStats, state::AppState};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;

/// A real router bound to an ephemeral port.
pub struct TestCluster {
    pub base_url: String,
    pub client: reqwest::Client,
    pub state: AppState,
    shutdown_tx: watch::Sender<bool>,
}

impl TestCluster {
    pub async fn new() -> Self {
        Self::with_config(ClusterConfig::default()).await
    }

    pub async fn with_config(config: ClusterConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info,packd_api_server=debug".into()),
            )
            .with_test_writer()
            .try_init();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState::new(config, shutdown_rx);
        let app = api::create_router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            state,
            shutdown_tx,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn post(&self, path: &str, body: Value) -> (reqwest::StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    pub async fn post_empty(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let resp = self.client.post(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    pub async fn get(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    /// Register a node and return its id.
    pub async fn register(&self, cpu_cores: i64) -> String {
        let (status, body) = self.post("/v1/nodes", json!({ "cpu_cores": cpu_cores })).await;
        assert_eq!(status, reqwest::StatusCode::CREATED, "register failed: {body}");
        body["node_id"].as_str().unwrap().to_string()
    }

    /// Place a pod, returning the raw response.
    pub async fn place(&self, cpu: i64) -> (reqwest::StatusCode, Value) {
        self.post("/v1/pods", json!({ "cpu_requirement": cpu })).await
    }

    /// Run a health scan as if `ahead` had passed since now.
    pub async fn scan_after(&self, ahead: Duration) -> ScanStats {
        self.state
            .health_monitor()
            .scan_at(Instant::now() + ahead)
            .await
    }

    /// Run a scan far enough ahead that every node is past its deadline.
    pub async fn expire_all_nodes(&self) -> ScanStats {
        let timeout = self.state.config().heartbeat_timeout();
        self.scan_after(timeout + Duration::from_secs(1)).await
    }

    pub async fn node(&self, node_id: &str) -> Value {
        let (status, body) = self.get(&format!("/v1/nodes/{node_id}")).await;
        assert_eq!(status, reqwest::StatusCode::OK, "get node failed: {body}");
        body
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
