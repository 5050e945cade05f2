//! Application state shared across request handlers.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::ClusterConfig;
use crate::health::HealthMonitor;
use crate::launcher::{NodeLauncher, SimulatedLauncher};
use crate::registration::RegistrationHandler;
use crate::scheduler::PodScheduler;
use crate::store::NodeStore;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ClusterConfig,
    store: Arc<NodeStore>,
    registration: Arc<RegistrationHandler>,
    scheduler: PodScheduler,
    launcher: Arc<dyn NodeLauncher>,
}

impl AppState {
    /// Wire up a fresh, empty cluster.
    ///
    /// Simulated nodes stop heartbeating once `shutdown` flips to true.
    pub fn new(config: ClusterConfig, shutdown: watch::Receiver<bool>) -> Self {
        let store = Arc::new(NodeStore::new());
        let registration = Arc::new(RegistrationHandler::new(
            Arc::clone(&store),
            config.heartbeat_interval,
        ));
        let launcher = Arc::new(SimulatedLauncher::new(Arc::clone(&registration), shutdown));
        Self::with_launcher(config, store, registration, launcher)
    }

    /// Wire up state around an existing store and launcher.
    pub fn with_launcher(
        config: ClusterConfig,
        store: Arc<NodeStore>,
        registration: Arc<RegistrationHandler>,
        launcher: Arc<dyn NodeLauncher>,
    ) -> Self {
        let scheduler = PodScheduler::new(
            Arc::clone(&store),
            config.placement_policy,
            config.max_placement_retries,
        );
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                registration,
                scheduler,
                launcher,
            }),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.inner.store
    }

    pub fn registration(&self) -> &RegistrationHandler {
        &self.inner.registration
    }

    pub fn scheduler(&self) -> &PodScheduler {
        &self.inner.scheduler
    }

    pub fn launcher(&self) -> &dyn NodeLauncher {
        self.inner.launcher.as_ref()
    }

    /// A monitor over this state's store, using the configured timeout.
    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(Arc::clone(&self.inner.store), self.inner.config.heartbeat_timeout())
    }
}
