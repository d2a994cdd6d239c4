//! Reconciliation entry points for the kube-runtime Controller.
//!
//! [`reconcile`] adapts [`CacheReconciler`] to the Controller's callback
//! shape and records metrics; [`error_policy`] decides when a failed Cache
//! is retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::{ResourceExt, runtime::controller::Action};
use tracing::{debug, error, warn};

use crate::controller::context::Context;
use crate::controller::error::Error;
use crate::controller::state_machine::{CacheReconciler, Reconciled};
use crate::crd::Cache;

/// Reconcile a Cache
///
/// Called by the controller for every change to a Cache or to a Deployment
/// it owns. The kube-runtime scheduler guarantees that one Cache is never
/// reconciled concurrently with itself.
pub async fn reconcile(obj: Arc<Cache>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    debug!(name = %name, namespace = %namespace, "Reconciling Cache");

    let reconciler = CacheReconciler::new(ctx.client.clone());
    let Reconciled { result, status } = reconciler
        .reconcile_with_status(&obj, &ctx.stopped)
        .await?;

    if let Some(ref health_state) = ctx.health_state {
        let metrics = &health_state.metrics;
        metrics.record_reconcile(&namespace, &name, start_time.elapsed().as_secs_f64());

        if obj.metadata.deletion_timestamp.is_some() && !result.requeue {
            metrics.forget_cache(&namespace, &name);
        } else if let Some(status) = status.as_ref().or(obj.status.as_ref()) {
            metrics.set_cache_size(
                &namespace,
                &name,
                i64::from(obj.spec.desired_size),
                i64::from(status.current_size),
            );
            metrics.set_cache_phase(&namespace, &name, &status.phase.to_string());
        }

        health_state.touch();
    }

    Ok(result.into())
}

/// Error policy for the controller
///
/// Determines how to handle reconciliation errors.
pub fn error_policy(obj: Arc<Cache>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Cache not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_conflict() {
        debug!(name = %name, error = %error, "Conflict, retrying immediately");
        return Action::requeue(Duration::ZERO);
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after())
}
