//! Registration and heartbeat loop.
//!
//! The agent registers once, then heartbeats on the interval the server
//! advertises. Heartbeat failures are logged and retried; a rejection
//! saying the node is dead or unknown triggers a fresh registration.

use std::time::Duration;

use packd_id::NodeId;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, error, info, instrument, warn};

use crate::client::{ApiClient, ClientError};

/// Failures logged as warnings before escalating to errors.
const WARN_FAILURES: u32 = 3;

/// A node id the server currently accepts heartbeats for.
#[derive(Debug, Clone, Copy)]
struct Session {
    node_id: NodeId,
    interval: Duration,
}

/// Keeps one node registered and alive.
pub struct NodeAgent {
    client: ApiClient,
    cpu_cores: i64,
    default_interval: Duration,
}

impl NodeAgent {
    pub fn new(client: ApiClient, cpu_cores: i64, default_interval: Duration) -> Self {
        Self {
            client,
            cpu_cores,
            default_interval,
        }
    }

    /// Register and heartbeat until shutdown is signaled.
    ///
    /// Returns an error only when the server refuses the registration
    /// outright (for example an invalid capacity).
    #[instrument(skip(self, shutdown), fields(cpu_cores = self.cpu_cores))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ClientError> {
        let Some(mut session) = self.register(&mut shutdown).await? else {
            return Ok(());
        };
        let mut ticker = heartbeat_timer(session.interval);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.client.heartbeat(session.node_id).await {
                        Ok(ack) => {
                            consecutive_failures = 0;
                            debug!(
                                node_id = %session.node_id,
                                accepted = ack.accepted,
                                next_interval = ack.next_heartbeat_secs,
                                "Heartbeat acknowledged"
                            );
                            let advertised = Duration::from_secs(ack.next_heartbeat_secs);
                            if ack.next_heartbeat_secs > 0 && advertised != session.interval {
                                info!(
                                    node_id = %session.node_id,
                                    interval_secs = ack.next_heartbeat_secs,
                                    "Heartbeat interval changed"
                                );
                                session.interval = advertised;
                                ticker = heartbeat_timer(advertised);
                            }
                        }
                        Err(e) if e.requires_reregistration() => {
                            warn!(
                                node_id = %session.node_id,
                                error = %e,
                                "Server no longer accepts this node, re-registering"
                            );
                            match self.register(&mut shutdown).await? {
                                Some(fresh) => {
                                    session = fresh;
                                    ticker = heartbeat_timer(session.interval);
                                    consecutive_failures = 0;
                                }
                                None => break,
                            }
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            log_failure(&e, consecutive_failures, "Heartbeat failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(node_id = %session.node_id, "Heartbeat loop shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Register, retrying transient failures until accepted or shut down.
    async fn register(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<Session>, ClientError> {
        let mut consecutive_failures = 0u32;

        loop {
            match self.client.register(self.cpu_cores).await {
                Ok(registration) => {
                    let interval = match registration.heartbeat_interval_secs {
                        0 => self.default_interval,
                        secs => Duration::from_secs(secs),
                    };
                    info!(
                        node_id = %registration.node_id,
                        cpu_cores = registration.cpu_cores,
                        interval_secs = interval.as_secs(),
                        "Node registered"
                    );
                    return Ok(Some(Session {
                        node_id: registration.node_id,
                        interval,
                    }));
                }
                Err(e) if e.is_retryable() => {
                    consecutive_failures += 1;
                    log_failure(&e, consecutive_failures, "Registration failed");
                }
                Err(e) => {
                    error!(error = %e, "Registration rejected");
                    return Err(e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.default_interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutting down before registration completed");
                        return Ok(None);
                    }
                }
            }
        }
    }
}

/// An interval whose first tick is one period away; registration counts
/// as the first heartbeat.
fn heartbeat_timer(period: Duration) -> Interval {
    interval_at(Instant::now() + period, period)
}

fn log_failure(error: &ClientError, consecutive_failures: u32, message: &str) {
    if consecutive_failures <= WARN_FAILURES {
        warn!(error = %error, consecutive_failures, "{message}");
    } else {
        error!(error = %error, consecutive_failures, "{message} repeatedly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registered(node_id: NodeId) -> ResponseTemplate {
        ResponseTemplate::new(201).set_body_json(json!({
            "node_id": node_id,
            "cpu_cores": 4,
            "heartbeat_interval_secs": 1,
        }))
    }

    fn accepted() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "accepted": true,
            "next_heartbeat_secs": 1,
        }))
    }

    fn agent(server: &MockServer) -> NodeAgent {
        NodeAgent::new(
            ApiClient::new(server.uri()).unwrap(),
            4,
            Duration::from_secs(1),
        )
    }

    async fn heartbeats_for(server: &MockServer, node_id: NodeId) -> usize {
        let wanted = format!("/v1/nodes/{node_id}/heartbeat");
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|req| req.url.path() == wanted)
            .count()
    }

    #[tokio::test]
    async fn test_registers_then_heartbeats() {
        let server = MockServer::start().await;
        let node_id = NodeId::new();

        Mock::given(method("POST"))
            .and(path("/v1/nodes"))
            .respond_with(registered(node_id))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/v1/nodes/{node_id}/heartbeat")))
            .respond_with(accepted())
            .mount(&server)
            .await;

        let agent = agent(&server);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { agent.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert!(heartbeats_for(&server, node_id).await >= 2);
    }

    #[tokio::test]
    async fn test_reregisters_after_being_declared_dead() {
        let server = MockServer::start().await;
        let dead = NodeId::new();
        let fresh = NodeId::new();

        Mock::given(method("POST"))
            .and(path("/v1/nodes"))
            .respond_with(registered(dead))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/nodes"))
            .respond_with(registered(fresh))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/v1/nodes/{dead}/heartbeat")))
            .respond_with(ResponseTemplate::new(410).set_body_json(json!({
                "code": "node_is_dead",
                "detail": "node is dead",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/v1/nodes/{fresh}/heartbeat")))
            .respond_with(accepted())
            .mount(&server)
            .await;

        let agent = agent(&server);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { agent.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(heartbeats_for(&server, dead).await, 1);
        assert!(heartbeats_for(&server, fresh).await >= 1);
    }

    #[tokio::test]
    async fn test_rejected_registration_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/nodes"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "invalid_capacity",
                "detail": "capacity must be positive",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let err = agent(&server).run(shutdown_rx).await.unwrap_err();
        assert_eq!(err.code(), Some("invalid_capacity"));
    }

    #[tokio::test]
    async fn test_shutdown_while_server_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/nodes"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let agent = agent(&server);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { agent.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        shutdown_tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());

        let attempts = server.received_requests().await.unwrap_or_default().len();
        assert!(attempts >= 2, "expected registration retries, saw {attempts}");
    }
}
