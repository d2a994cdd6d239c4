//! Operator configuration.
//!
//! Runtime settings come from the environment; everything else is a fixed
//! constant shared by `main` and the servers it starts.

use std::time::Duration;

use tracing::warn;

/// Name of the leader election Lease
pub const LEASE_NAME: &str = "cache-operator-leader";
/// How long a Lease stays valid without renewal
pub const LEASE_TTL: Duration = Duration::from_secs(15);
/// Interval between Lease acquire/renew attempts
pub const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);
/// Grace period for in-flight reconciliations to complete during shutdown
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Settings read from the process environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Leader election identity (`POD_NAME`, falls back to the hostname)
    pub pod_name: String,
    /// Namespace holding the Lease (`POD_NAMESPACE`, default `default`)
    pub pod_namespace: String,
    /// Restrict the controller to one namespace (`WATCH_NAMESPACE`)
    pub watch_namespace: Option<String>,
}

impl OperatorConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let pod_name = non_empty("POD_NAME").unwrap_or_else(|| {
            warn!("POD_NAME not set, using hostname");
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        });
        let pod_namespace = non_empty("POD_NAMESPACE").unwrap_or_else(|| {
            warn!("POD_NAMESPACE not set, using 'default'");
            "default".to_string()
        });

        Self {
            pod_name,
            pod_namespace,
            watch_namespace: non_empty("WATCH_NAMESPACE"),
        }
    }

    /// Human readable controller scope for logs
    pub fn scope(&self) -> &str {
        self.watch_namespace.as_deref().unwrap_or("cluster-wide")
    }
}
