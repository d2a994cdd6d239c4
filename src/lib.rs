//! cache-operator library crate
//!
//! Runs Cache resources as engine Deployments. The reconciliation core lives
//! in [`controller`]; this module wires it into a kube-runtime `Controller`.

pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod leader_election;
pub mod resources;
pub mod webhooks;

pub use health::HealthState;
pub use webhooks::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, run_webhook_server,
};

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::controller::{self as runtime_controller, Action};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, predicates, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use controller::error::Error;
use controller::{context::Context, reconciler};
use crd::Cache;

/// Api handle limited to `namespace`, or cluster-wide when `None`
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    namespace.map_or_else(
        || Api::all(client.clone()),
        |ns| Api::namespaced(client.clone(), ns),
    )
}

/// Lists may be answered from the API server watch cache
fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Cache events as seen by the controller: reflected into a store, backed
/// off on watch errors, and reduced to spec/metadata generations so status
/// patches do not re-trigger a reconcile.
fn cache_stream(
    caches: Api<Cache>,
) -> (
    Store<Cache>,
    impl Stream<Item = Result<Cache, watcher::Error>>,
) {
    let (store, writer) = reflector::store();
    let stream = reflector(writer, watcher(caches, watcher_config()))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);
    (store, stream)
}

/// Run the Cache controller, optionally limited to one namespace.
///
/// Reconciles each Cache on its own changes and on changes to the
/// Deployments it owns. Once `stopped` is raised, reconciles return without
/// touching the cluster. Returns only if the watch stream ends.
pub async fn run_controller_scoped(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    stopped: Arc<AtomicBool>,
    namespace: Option<&str>,
) {
    info!(scope = namespace.unwrap_or("cluster-wide"), "Starting Cache controller");

    if let Some(state) = &health_state {
        state.set_ready(true).await;
    }

    let caches: Api<Cache> = scoped_api(client.clone(), namespace);
    let deployments: Api<Deployment> = scoped_api(client.clone(), namespace);
    let ctx = Arc::new(Context::new(client, health_state, stopped));

    let (store, stream) = cache_stream(caches);

    // No generation filter here: availableReplicas only moves in status
    Controller::for_stream(stream, store)
        .owns(deployments, watcher_config())
        .run(reconciler::reconcile, reconciler::error_policy, ctx)
        .for_each(|result| async move { log_outcome(result) })
        .await;

    error!("Controller stream ended unexpectedly");
}

type Outcome = Result<
    (ObjectRef<Cache>, Action),
    runtime_controller::Error<Error, watcher::Error>,
>;

fn log_outcome(result: Outcome) {
    match result {
        Ok((cache, action)) => debug!(cache = %cache, ?action, "Reconciled"),
        // Deployment events can still arrive after their Cache is gone
        Err(runtime_controller::Error::ObjectNotFound(cache)) => {
            debug!(cache = %cache, "Cache no longer exists")
        }
        Err(runtime_controller::Error::ReconcilerFailed(e, cache)) if e.is_not_found() => {
            debug!(cache = %cache, error = %e, "Cache no longer exists")
        }
        Err(e) => error!(error = ?e, "Reconciliation failed"),
    }
}
