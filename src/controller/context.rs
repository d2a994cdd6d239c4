//! Shared context for the controller.
//!
//! The Context struct holds the state handed to every reconcile call: the
//! cluster API capability, optional health state, and the shutdown flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use kube::Client;

use crate::controller::cluster_api::{CacheClient, KubeCacheClient};
use crate::health::HealthState;

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Cluster API capability used by the reconciler
    pub client: Arc<dyn CacheClient>,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
    /// Raised when the process is shutting down
    pub stopped: Arc<AtomicBool>,
}

impl Context {
    /// Create a context backed by a live Kubernetes client
    pub fn new(
        client: Client,
        health_state: Option<Arc<HealthState>>,
        stopped: Arc<AtomicBool>,
    ) -> Self {
        Self::with_client(Arc::new(KubeCacheClient::new(client)), health_state, stopped)
    }

    /// Create a context around any [`CacheClient`] implementation
    pub fn with_client(
        client: Arc<dyn CacheClient>,
        health_state: Option<Arc<HealthState>>,
        stopped: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            health_state,
            stopped,
        }
    }

    /// Whether shutdown has been signalled
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
