//! Reconciliation state machine for Cache resources.
//!
//! One invocation takes a Cache snapshot to completion:
//!
//! 1. bail out without side effects when shutdown has been signalled,
//! 2. list the Deployments owned by the Cache,
//! 3. pick exactly one [`ReconcileStep`] from an ordered decision chain,
//! 4. perform it through the injected [`CacheClient`] and report a
//!    [`ReconcileResult`] telling the caller when to come back.
//!
//! Finalizer changes and status changes are always separate writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::controller::cluster_api::CacheClient;
use crate::controller::error::{Error, Result};
use crate::controller::ownership::owned_by;
use crate::controller::status::upsert_condition;
use crate::crd::{CONDITION_READY, Cache, CachePhase, CacheStatus, ConditionStatus};
use crate::resources::common::engine_selector;
use crate::resources::deployment::generate_deployment;

/// Finalizer guarding Deployment cleanup
pub const FINALIZER: &str = "kuroboros.io/cache-operator";

/// Poll interval while owned Deployments are being deleted
pub const TEARDOWN_REQUEUE: Duration = Duration::from_secs(5);
/// Delay after creating a Deployment before observing it
pub const CREATE_REQUEUE: Duration = Duration::from_secs(10);
/// Poll interval for replica health
pub const OBSERVE_REQUEUE: Duration = Duration::from_secs(5);

/// What the invoking engine should do next with this Cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Whether to reconcile this Cache again
    pub requeue: bool,
    /// Delay before the next reconcile (meaningful only when `requeue`)
    pub requeue_after: Duration,
}

impl ReconcileResult {
    /// Nothing left to do; wait for the next change
    pub const fn done() -> Self {
        Self {
            requeue: false,
            requeue_after: Duration::ZERO,
        }
    }

    /// Reconcile again right away
    pub const fn requeue_now() -> Self {
        Self::requeue_after(Duration::ZERO)
    }

    /// Reconcile again after `delay`
    pub const fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue: true,
            requeue_after: delay,
        }
    }
}

/// A [`ReconcileResult`] plus the status this invocation wrote or confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub result: ReconcileResult,
    /// `None` when the branch taken never looks at status
    pub status: Option<CacheStatus>,
}

impl From<ReconcileResult> for Reconciled {
    fn from(result: ReconcileResult) -> Self {
        Self {
            result,
            status: None,
        }
    }
}

impl From<ReconcileResult> for Action {
    fn from(result: ReconcileResult) -> Self {
        if result.requeue {
            Action::requeue(result.requeue_after)
        } else {
            Action::await_change()
        }
    }
}

/// Branch selected for one invocation. Earlier variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    /// Deleting, finalizer held, children remain: delete them
    DeleteChildren,
    /// Deleting, finalizer held, no children: release the finalizer
    ReleaseFinalizer,
    /// Deleting without our finalizer: nothing to clean up
    Forget,
    /// No status yet: write the initial status
    InitializeStatus,
    /// No finalizer and no children: add the finalizer, then create
    Create,
    /// Finalizer held but the Deployment is gone: create it again
    Recreate,
    /// A Deployment exists: converge its size and report health
    Observe,
}

/// Pick the branch for a snapshot given whether it owns any Deployment.
pub fn determine_step(cache: &Cache, has_children: bool) -> ReconcileStep {
    let has_finalizer = has_finalizer(cache);

    if cache.metadata.deletion_timestamp.is_some() {
        return match (has_finalizer, has_children) {
            (true, true) => ReconcileStep::DeleteChildren,
            (true, false) => ReconcileStep::ReleaseFinalizer,
            (false, _) => ReconcileStep::Forget,
        };
    }

    if cache.status.is_none() {
        ReconcileStep::InitializeStatus
    } else if has_children {
        ReconcileStep::Observe
    } else if has_finalizer {
        ReconcileStep::Recreate
    } else {
        ReconcileStep::Create
    }
}

/// Whether the Cache carries this operator's finalizer
pub fn has_finalizer(cache: &Cache) -> bool {
    cache.finalizers().iter().any(|f| f == FINALIZER)
}

/// Phase and Ready condition derived from replica counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthObservation {
    pub phase: CachePhase,
    pub status: ConditionStatus,
    pub reason: &'static str,
    pub message: &'static str,
}

/// Compare available replicas to the desired size.
pub fn observe_health(desired: i32, available: i32) -> HealthObservation {
    if available == desired {
        HealthObservation {
            phase: CachePhase::Healthy,
            status: ConditionStatus::True,
            reason: "DesiredReached",
            message: "Desired match current",
        }
    } else {
        HealthObservation {
            phase: CachePhase::Progressing,
            status: ConditionStatus::False,
            reason: "Progressing",
            message: "Desired dont match current",
        }
    }
}

/// Drives a Cache toward its declared state.
///
/// Holds no per-resource state; the caller guarantees that a given Cache is
/// never reconciled by two invocations at once.
pub struct CacheReconciler {
    client: Arc<dyn CacheClient>,
}

impl CacheReconciler {
    /// Create a reconciler on top of the given cluster capability
    pub fn new(client: Arc<dyn CacheClient>) -> Self {
        Self { client }
    }

    /// Reconcile one Cache snapshot.
    ///
    /// A stale write (409 Conflict) is turned into an immediate requeue so the
    /// next invocation starts from a fresh snapshot. Any other API failure is
    /// returned to the caller.
    pub async fn reconcile(&self, cache: &Cache, stopped: &AtomicBool) -> Result<ReconcileResult> {
        Ok(self.reconcile_with_status(cache, stopped).await?.result)
    }

    /// Same as [`reconcile`](Self::reconcile), also reporting the status the
    /// Cache was left with.
    pub async fn reconcile_with_status(
        &self,
        cache: &Cache,
        stopped: &AtomicBool,
    ) -> Result<Reconciled> {
        if stopped.load(Ordering::SeqCst) {
            debug!(name = %cache.name_any(), "Shutdown in progress, skipping reconcile");
            return Ok(ReconcileResult::done().into());
        }

        match self.run(cache).await {
            Err(e) if e.is_conflict() => {
                debug!(name = %cache.name_any(), error = %e, "Stale write, requeueing");
                Ok(ReconcileResult::requeue_now().into())
            }
            other => other,
        }
    }

    async fn run(&self, cache: &Cache) -> Result<Reconciled> {
        let namespace = cache
            .namespace()
            .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
        let name = cache
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::MissingField("metadata.name".to_string()))?;
        // Children are matched by owner UID; without one nothing could ever match
        if cache.uid().is_none_or(|uid| uid.is_empty()) {
            return Err(Error::MissingField("metadata.uid".to_string()));
        }

        let children = self.list_owned(cache, &namespace).await?;
        let step = determine_step(cache, !children.is_empty());
        debug!(
            name = %name,
            namespace = %namespace,
            children = children.len(),
            step = ?step,
            "Reconciling Cache"
        );

        let result = match step {
            ReconcileStep::DeleteChildren => self.delete_children(cache, &namespace, &children).await?,
            ReconcileStep::ReleaseFinalizer => self.release_finalizer(cache, &namespace, &name).await?,
            ReconcileStep::Forget => ReconcileResult::done(),
            ReconcileStep::InitializeStatus => return self.initialize_status(&namespace, &name).await,
            ReconcileStep::Create => {
                self.add_finalizer(cache, &namespace, &name).await?;
                self.create_child(cache, &namespace).await?
            }
            ReconcileStep::Recreate => {
                warn!(name = %name, "Owned Deployment missing, recreating");
                self.create_child(cache, &namespace).await?
            }
            ReconcileStep::Observe => return self.observe(cache, &namespace, &name, &children).await,
        };
        Ok(result.into())
    }

    /// Deployments labelled with the engine and owned by this Cache's UID
    async fn list_owned(&self, cache: &Cache, namespace: &str) -> Result<Vec<Deployment>> {
        let candidates = self
            .client
            .list_deployments(namespace, &engine_selector(cache))
            .await?;
        Ok(owned_by(cache, candidates))
    }

    async fn delete_children(
        &self,
        cache: &Cache,
        namespace: &str,
        children: &[Deployment],
    ) -> Result<ReconcileResult> {
        for child in children {
            let child_name = child.name_any();
            info!(name = %cache.name_any(), deployment = %child_name, "Deleting owned Deployment");
            self.client.delete_deployment(namespace, &child_name).await?;
        }

        self.client
            .publish_event(
                cache,
                EventType::Normal,
                "DeletingDeployments",
                "Teardown",
                Some(format!("Deleting {} owned Deployment(s)", children.len())),
            )
            .await;

        Ok(ReconcileResult::requeue_after(TEARDOWN_REQUEUE))
    }

    async fn release_finalizer(
        &self,
        cache: &Cache,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileResult> {
        let remaining: Vec<String> = cache
            .finalizers()
            .iter()
            .filter(|f| *f != FINALIZER)
            .cloned()
            .collect();

        info!(name = %name, "All Deployments gone, removing finalizer");
        self.client
            .patch_cache_finalizers(namespace, name, cache.resource_version(), remaining)
            .await?;

        Ok(ReconcileResult::done())
    }

    async fn initialize_status(&self, namespace: &str, name: &str) -> Result<Reconciled> {
        info!(name = %name, "Initializing status");
        let status = CacheStatus::initial();
        self.client.patch_cache_status(namespace, name, &status).await?;
        Ok(Reconciled {
            result: ReconcileResult::requeue_now(),
            status: Some(status),
        })
    }

    async fn add_finalizer(&self, cache: &Cache, namespace: &str, name: &str) -> Result<()> {
        let mut finalizers = cache.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());

        info!(name = %name, "Adding finalizer");
        self.client
            .patch_cache_finalizers(namespace, name, cache.resource_version(), finalizers)
            .await
    }

    async fn create_child(&self, cache: &Cache, namespace: &str) -> Result<ReconcileResult> {
        let deployment = generate_deployment(cache);
        let deployment_name = deployment.name_any();

        match self.client.create_deployment(namespace, &deployment).await {
            Ok(_) => {
                info!(
                    name = %cache.name_any(),
                    deployment = %deployment_name,
                    replicas = cache.spec.desired_size,
                    "Created Deployment"
                );
                self.client
                    .publish_event(
                        cache,
                        EventType::Normal,
                        "Created",
                        "CreateDeployment",
                        Some(format!("Created Deployment {}", deployment_name)),
                    )
                    .await;
            }
            Err(e) if e.is_already_exists() => {
                // Name taken by a Deployment this Cache does not own
                warn!(
                    name = %cache.name_any(),
                    deployment = %deployment_name,
                    "Deployment name already in use"
                );
                self.client
                    .publish_event(
                        cache,
                        EventType::Warning,
                        "NameConflict",
                        "CreateDeployment",
                        Some(format!(
                            "Deployment {} exists and is not owned by this Cache",
                            deployment_name
                        )),
                    )
                    .await;
            }
            Err(e) => return Err(e),
        }

        Ok(ReconcileResult::requeue_after(CREATE_REQUEUE))
    }

    async fn observe(
        &self,
        cache: &Cache,
        namespace: &str,
        name: &str,
        children: &[Deployment],
    ) -> Result<Reconciled> {
        let Some(child) = children.first() else {
            return Ok(ReconcileResult::requeue_after(OBSERVE_REQUEUE).into());
        };
        if children.len() > 1 {
            warn!(
                name = %name,
                count = children.len(),
                "{} deployments found, using first one",
                children.len()
            );
        }

        let desired = cache.spec.desired_size;
        // Kubernetes defaults an unset replica count to 1
        let declared = child.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        if declared != desired {
            info!(
                name = %name,
                deployment = %child.name_any(),
                from = declared,
                to = desired,
                "Scaling Deployment"
            );
            self.client
                .scale_deployment(namespace, &child.name_any(), desired)
                .await?;
            self.client
                .publish_event(
                    cache,
                    EventType::Normal,
                    "Scaled",
                    "ScaleDeployment",
                    Some(format!("Scaled from {} to {} replicas", declared, desired)),
                )
                .await;
        }

        let available = child
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0);

        let previous = cache.status.clone().unwrap_or_else(CacheStatus::initial);
        let observation = observe_health(desired, available);
        let mut status = previous.clone();
        status.current_size = available;
        status.phase = observation.phase;
        upsert_condition(
            &mut status.conditions,
            CONDITION_READY,
            observation.status,
            observation.reason,
            observation.message,
        );

        if status == previous {
            debug!(name = %name, available, desired, "Status unchanged");
        } else {
            self.client.patch_cache_status(namespace, name, &status).await?;
            debug!(name = %name, available, desired, phase = %status.phase, "Status updated");

            if status.phase == CachePhase::Healthy && previous.phase != CachePhase::Healthy {
                self.client
                    .publish_event(
                        cache,
                        EventType::Normal,
                        "Healthy",
                        "Reconciling",
                        Some(format!("{}/{} replicas available", available, desired)),
                    )
                    .await;
            }
        }

        Ok(Reconciled {
            result: ReconcileResult::requeue_after(OBSERVE_REQUEUE),
            status: Some(status),
        })
    }
}
