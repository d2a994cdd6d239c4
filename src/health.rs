//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 when ready to serve traffic)
//! - `/metrics` - Prometheus metrics endpoint

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::{Metric, Registry};
use tokio::sync::RwLock;
use tracing::info;

use crate::crd::CachePhase;

/// Port the health server listens on
pub const HEALTH_PORT: u16 = 8080;

/// Identifies one Cache in per-object series
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CacheLabels {
    pub namespace: String,
    pub name: String,
}

/// Label of the per-phase gauge
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PhaseLabels {
    pub phase: String,
}

/// Shared metrics for the operator
pub struct Metrics {
    /// Total reconciliations counter
    pub reconciliations_total: Family<CacheLabels, Counter>,
    /// Failed reconciliations counter
    pub reconciliation_errors_total: Family<CacheLabels, Counter>,
    /// Reconciliation duration histogram
    pub reconcile_duration_seconds: Family<CacheLabels, Histogram>,
    /// Caches by phase
    pub caches_total: Family<PhaseLabels, Gauge>,
    /// Desired size per Cache
    pub cache_size_desired: Family<CacheLabels, Gauge>,
    /// Available replicas per Cache
    pub cache_size_current: Family<CacheLabels, Gauge>,
    /// Last observed phase per Cache, used to derive `caches_total`
    phases: Mutex<HashMap<CacheLabels, String>>,
    /// Prometheus registry
    registry: Registry,
}

fn duration_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.001, 2.0, 15))
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn cache_labels(namespace: &str, name: &str) -> CacheLabels {
    CacheLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

/// Register `metric` under `name` and hand it back for storage
fn register<M>(registry: &mut Registry, name: &str, help: &str, metric: M) -> M
where
    M: Metric + Clone,
{
    registry.register(name, help, metric.clone());
    metric
}

impl Metrics {
    /// Registry with every cache-operator series registered
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let r = &mut registry;

        Self {
            reconciliations_total: register(
                r,
                "cache_operator_reconciliations",
                "Completed reconciliations per Cache",
                Family::default(),
            ),
            reconciliation_errors_total: register(
                r,
                "cache_operator_reconciliation_errors",
                "Failed reconciliations per Cache",
                Family::default(),
            ),
            reconcile_duration_seconds: register(
                r,
                "cache_operator_reconcile_duration_seconds",
                "Time spent in one reconcile",
                Family::new_with_constructor(duration_histogram),
            ),
            caches_total: register(
                r,
                "cache_operator_caches",
                "Cache resources by phase",
                Family::default(),
            ),
            cache_size_desired: register(
                r,
                "cache_operator_cache_size_desired",
                "spec.desiredSize of each Cache",
                Family::default(),
            ),
            cache_size_current: register(
                r,
                "cache_operator_cache_size_current",
                "Available replicas of each Cache",
                Family::default(),
            ),
            phases: Mutex::new(HashMap::new()),
            registry,
        }
    }

    /// Record a successful reconciliation
    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let labels = cache_labels(namespace, name);
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a failed reconciliation
    pub fn record_error(&self, namespace: &str, name: &str) {
        self.reconciliation_errors_total
            .get_or_create(&cache_labels(namespace, name))
            .inc();
    }

    /// Update size gauges for a Cache
    pub fn set_cache_size(&self, namespace: &str, name: &str, desired: i64, current: i64) {
        let labels = cache_labels(namespace, name);
        self.cache_size_desired.get_or_create(&labels).set(desired);
        self.cache_size_current.get_or_create(&labels).set(current);
    }

    /// Record the phase of a Cache and refresh the per-phase counts
    pub fn set_cache_phase(&self, namespace: &str, name: &str, phase: &str) {
        let mut phases = self.phases.lock().unwrap_or_else(PoisonError::into_inner);
        phases.insert(cache_labels(namespace, name), phase.to_string());
        self.refresh_phase_counts(&phases);
    }

    /// Drop every per-Cache series once a Cache is gone
    pub fn forget_cache(&self, namespace: &str, name: &str) {
        let labels = cache_labels(namespace, name);
        self.cache_size_desired.remove(&labels);
        self.cache_size_current.remove(&labels);

        let mut phases = self.phases.lock().unwrap_or_else(PoisonError::into_inner);
        phases.remove(&labels);
        self.refresh_phase_counts(&phases);
    }

    fn refresh_phase_counts(&self, phases: &HashMap<CacheLabels, String>) {
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for phase in phases.values() {
            *counts.entry(phase.as_str()).or_default() += 1;
        }
        for phase in [CachePhase::Progressing, CachePhase::Healthy] {
            let phase = phase.to_string();
            let count = counts.get(phase.as_str()).copied().unwrap_or(0);
            self.caches_total
                .get_or_create(&PhaseLabels { phase })
                .set(count);
        }
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the operator is ready (acquired leadership and running controller)
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
    /// Last completed reconcile (Unix epoch seconds)
    last_reconcile: AtomicI64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
            last_reconcile: AtomicI64::new(0),
        }
    }

    /// Mark the operator as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the operator is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    /// Note that a reconcile just completed
    pub fn touch(&self) {
        self.last_reconcile
            .store(jiff::Timestamp::now().as_second(), Ordering::Relaxed);
    }

    /// Unix time of the last completed reconcile, 0 if none yet
    pub fn last_reconcile(&self) -> i64 {
        self.last_reconcile.load(Ordering::Relaxed)
    }
}

/// Answers as long as the process is serving HTTP
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// 200 while the controller runs, 503 before leadership and after shutdown starts
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0:`port` and serves health/metrics endpoints.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
