//! In-memory stand-in for the Kubernetes API used by functional tests.
//!
//! `FakeCluster` implements `CacheClient` over a single Cache plus any number
//! of Deployments. It mimics the API server behaviors the reconciler relies
//! on:
//! 1. label selector filtering on list
//! 2. `AlreadyExists` on a duplicate create
//! 3. `Conflict` when a finalizer patch carries a stale resourceVersion
//! 4. object removal once a deleting Cache drops its last finalizer
//! 5. `NotFound` when deleting a Deployment that is already gone

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cache_operator::controller::cluster_api::{CacheClient, ignore_not_found};
use cache_operator::controller::error::{Error, Result};
use cache_operator::controller::state_machine::{CacheReconciler, ReconcileResult};
use cache_operator::crd::{Cache, CachePhase, CacheStatus};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use kube::runtime::events::EventType;

/// One call made against the fake, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(String),
    Create(String),
    Scale(String, i32),
    Delete(String),
    Finalizers(Vec<String>),
    Status(CachePhase, i32),
    Event(String),
}

#[derive(Default)]
struct State {
    cache: Option<Cache>,
    deployments: Vec<Deployment>,
    calls: Vec<Call>,
    version: u64,
    /// Deployments garbage collected right after the next list
    vanishing: Vec<String>,
}

impl State {
    fn bump(&mut self) {
        self.version += 1;
        let version = self.version.to_string();
        if let Some(cache) = self.cache.as_mut() {
            cache.metadata.resource_version = Some(version);
        }
    }
}

fn kube_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} ({})", reason, code),
        reason: reason.to_string(),
        code,
    })
}

fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube_error(code, reason))
}

fn matches_selector(deployment: &Deployment, selector: &str) -> bool {
    let labels = deployment.labels();
    selector.split(',').all(|term| match term.split_once('=') {
        Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
        None => false,
    })
}

/// Stateful fake API server for one Cache.
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    /// Store `cache` as the only Cache in the cluster.
    pub fn new(cache: Cache) -> Arc<Self> {
        let mut state = State::default();
        state.cache = Some(cache);
        state.bump();
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Current stored Cache, `None` once it has been removed.
    pub fn snapshot(&self) -> Option<Cache> {
        self.state().cache.clone()
    }

    /// Every Deployment in the namespace.
    pub fn deployments(&self) -> Vec<Deployment> {
        self.state().deployments.clone()
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Place a Deployment in the namespace directly.
    pub fn add_deployment(&self, deployment: Deployment) {
        self.state().deployments.push(deployment);
    }

    /// Remove a Deployment without going through the reconciler.
    pub fn remove_deployment(&self, name: &str) {
        self.state().deployments.retain(|d| d.name_any() != name);
    }

    /// Let the next list return `name`, then drop it before any delete lands.
    pub fn vanish_after_list(&self, name: &str) {
        self.state().vanishing.push(name.to_string());
    }

    /// Report `available` replicas on the Deployment called `name`.
    pub fn set_available(&self, name: &str, available: i32) {
        let mut state = self.state();
        for deployment in state.deployments.iter_mut().filter(|d| d.name_any() == name) {
            deployment.status = Some(DeploymentStatus {
                available_replicas: Some(available),
                ..Default::default()
            });
        }
    }

    /// Change the stored Cache as a user edit would.
    pub fn edit(&self, change: impl FnOnce(&mut Cache)) {
        let mut state = self.state();
        if let Some(cache) = state.cache.as_mut() {
            change(cache);
        }
        state.bump();
    }

    /// Request deletion of the Cache.
    pub fn request_deletion(&self) {
        self.edit(|cache| {
            cache.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
        });
    }

    /// Reconcile the stored Cache once.
    pub async fn reconcile(self: &Arc<Self>) -> ReconcileResult {
        let snapshot = self.snapshot().expect("cache should exist");
        self.reconcile_snapshot(&snapshot, false).await
    }

    /// Reconcile the stored Cache once, keeping any error.
    pub async fn try_reconcile(self: &Arc<Self>) -> Result<ReconcileResult> {
        let snapshot = self.snapshot().expect("cache should exist");
        let client: Arc<dyn CacheClient> = self.clone();
        CacheReconciler::new(client)
            .reconcile(&snapshot, &AtomicBool::new(false))
            .await
    }

    /// Reconcile an explicit (possibly stale) snapshot.
    pub async fn reconcile_snapshot(self: &Arc<Self>, snapshot: &Cache, stopped: bool) -> ReconcileResult {
        let client: Arc<dyn CacheClient> = self.clone();
        CacheReconciler::new(client)
            .reconcile(snapshot, &AtomicBool::new(stopped))
            .await
            .expect("reconcile should succeed")
    }
}

#[async_trait]
impl CacheClient for FakeCluster {
    async fn list_deployments(&self, _namespace: &str, label_selector: &str) -> Result<Vec<Deployment>> {
        let mut state = self.state();
        state.calls.push(Call::List(label_selector.to_string()));
        let listed: Vec<Deployment> = state
            .deployments
            .iter()
            .filter(|d| matches_selector(d, label_selector))
            .cloned()
            .collect();

        let vanishing = std::mem::take(&mut state.vanishing);
        state.deployments.retain(|d| !vanishing.contains(&d.name_any()));
        Ok(listed)
    }

    async fn create_deployment(&self, _namespace: &str, deployment: &Deployment) -> Result<Deployment> {
        let mut state = self.state();
        let name = deployment.name_any();
        state.calls.push(Call::Create(name.clone()));
        if state.deployments.iter().any(|d| d.name_any() == name) {
            return Err(api_error(409, "AlreadyExists"));
        }
        state.deployments.push(deployment.clone());
        Ok(deployment.clone())
    }

    async fn scale_deployment(&self, _namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Scale(name.to_string(), replicas));
        let deployment = state
            .deployments
            .iter_mut()
            .find(|d| d.name_any() == name)
            .ok_or_else(|| api_error(404, "NotFound"))?;
        if let Some(spec) = deployment.spec.as_mut() {
            spec.replicas = Some(replicas);
        }
        Ok(())
    }

    async fn delete_deployment(&self, _namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Delete(name.to_string()));
        let before = state.deployments.len();
        state.deployments.retain(|d| d.name_any() != name);
        let result = if state.deployments.len() == before {
            Err(kube_error(404, "NotFound"))
        } else {
            Ok(())
        };
        ignore_not_found(result)
    }

    async fn patch_cache_finalizers(
        &self,
        _namespace: &str,
        _name: &str,
        resource_version: Option<String>,
        finalizers: Vec<String>,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Finalizers(finalizers.clone()));

        let current = state.version.to_string();
        let Some(cache) = state.cache.as_mut() else {
            return Err(api_error(404, "NotFound"));
        };
        if resource_version.is_some_and(|v| v != current) {
            return Err(api_error(409, "Conflict"));
        }

        let released = finalizers.is_empty() && cache.metadata.deletion_timestamp.is_some();
        cache.metadata.finalizers = Some(finalizers);
        if released {
            state.cache = None;
        } else {
            state.bump();
        }
        Ok(())
    }

    async fn patch_cache_status(&self, _namespace: &str, _name: &str, status: &CacheStatus) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Status(status.phase, status.current_size));
        let Some(cache) = state.cache.as_mut() else {
            return Err(api_error(404, "NotFound"));
        };
        cache.status = Some(status.clone());
        state.bump();
        Ok(())
    }

    async fn publish_event(
        &self,
        _cache: &Cache,
        _type_: EventType,
        reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
        self.state().calls.push(Call::Event(reason.to_string()));
    }
}
