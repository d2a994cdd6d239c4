//! Common resource generation utilities.
//!
//! Labels and owner references shared by every object the operator creates
//! for a Cache.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::Cache;

/// Label carrying the engine name; the reconciler lists children by it.
pub const ENGINE_LABEL: &str = "app";
/// Label carrying the owning Cache name.
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
/// Label marking objects managed by this operator.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Value of [`MANAGED_BY_LABEL`].
pub const MANAGER_NAME: &str = "cache-operator";

/// Label selector string used to list candidate children of a Cache.
pub fn engine_selector(cache: &Cache) -> String {
    format!("{}={}", ENGINE_LABEL, cache.spec.engine)
}

/// Labels matched by the Deployment selector and stamped on pods.
pub fn selector_labels(cache: &Cache) -> BTreeMap<String, String> {
    BTreeMap::from([
        (ENGINE_LABEL.to_string(), cache.spec.engine.to_string()),
        (INSTANCE_LABEL.to_string(), cache.name_any()),
    ])
}

/// Standard labels applied to all managed resources
pub fn standard_labels(cache: &Cache) -> BTreeMap<String, String> {
    let mut labels = selector_labels(cache);
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGER_NAME.to_string());
    labels
}

/// Controlling owner reference pointing back at the Cache
pub fn owner_reference(cache: &Cache) -> OwnerReference {
    OwnerReference {
        api_version: Cache::api_version(&()).to_string(),
        kind: Cache::kind(&()).to_string(),
        name: cache.name_any(),
        uid: cache.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
