//! Cluster API capability used by the Cache reconciler.
//!
//! The reconciler never touches `kube::Client` directly. Everything it reads
//! or writes goes through [`CacheClient`], which production code backs with
//! [`KubeCacheClient`] and tests replace with a mock or a recording fake.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::controller::error::{Error, Result};
use crate::crd::{Cache, CacheStatus};

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "cache-operator";

/// Trait abstracting the Kubernetes operations the reconciler performs.
///
/// Every call is awaited to completion before the next one is issued, so
/// from the reconciler's point of view they are sequential and blocking.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// List Deployments in `namespace` matching `label_selector`
    async fn list_deployments(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Deployment>>;

    /// Create a Deployment; fails with 409 AlreadyExists on a name clash
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment)
    -> Result<Deployment>;

    /// Set `spec.replicas` on a Deployment
    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<()>;

    /// Delete a Deployment; an already-deleted Deployment is not an error
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()>;

    /// Replace the finalizer list of a Cache.
    ///
    /// When `resource_version` is given the write is rejected with 409
    /// Conflict if the Cache changed since that version was read.
    async fn patch_cache_finalizers(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        finalizers: Vec<String>,
    ) -> Result<()>;

    /// Write the status sub-resource of a Cache
    async fn patch_cache_status(&self, namespace: &str, name: &str, status: &CacheStatus)
    -> Result<()>;

    /// Publish a Kubernetes Event on a Cache. Failures are logged, not returned.
    async fn publish_event(
        &self,
        cache: &Cache,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Collapse a delete result: a 404 means the object is already gone.
pub fn ignore_not_found<T>(result: kube::Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(Error::Kube(e)),
    }
}

/// Real Kubernetes client implementation
pub struct KubeCacheClient {
    client: Client,
    recorder: Recorder,
}

impl KubeCacheClient {
    /// Wrap a Kubernetes client
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.into(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
        }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn caches(&self, namespace: &str) -> Api<Cache> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl CacheClient for KubeCacheClient {
    async fn list_deployments(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Deployment>> {
        let list = self
            .deployments(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items)
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment> {
        let created = self
            .deployments(namespace)
            .create(&PostParams::default(), deployment)
            .await?;
        Ok(created)
    }

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let patch = serde_json::json!({
            "spec": {
                "replicas": replicas
            }
        });
        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()> {
        let result = self
            .deployments(namespace)
            .delete(name, &DeleteParams::background())
            .await;
        ignore_not_found(result).inspect(|()| debug!(name = %name, "Deployment deleted"))
    }

    async fn patch_cache_finalizers(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        finalizers: Vec<String>,
    ) -> Result<()> {
        let mut metadata = serde_json::json!({ "finalizers": finalizers });
        if let Some(version) = resource_version {
            metadata["resourceVersion"] = serde_json::Value::String(version);
        }
        let patch = serde_json::json!({ "metadata": metadata });
        self.caches(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_cache_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CacheStatus,
    ) -> Result<()> {
        let patch = serde_json::json!({
            "status": serde_json::to_value(status)?
        });
        self.caches(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn publish_event(
        &self,
        cache: &Cache,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.into(),
            note,
            action: action.into(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &cache.object_ref(&())).await {
            warn!(reason = %reason, error = %e, "Failed to publish event");
        }
    }
}
