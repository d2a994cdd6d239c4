//! Ownership filter for child Deployments.
//!
//! Children are listed by the engine label, which other workloads in the
//! namespace may share. A candidate only belongs to a Cache when one of its
//! owner references carries the Cache's UID; names are never compared.

use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;

use crate::crd::Cache;

/// Whether `child` has an owner reference with the given UID.
pub fn is_owned_by_uid(child: &Deployment, uid: &str) -> bool {
    child.owner_references().iter().any(|owner| owner.uid == uid)
}

/// Keep only the candidates owned by `cache`, preserving list order.
///
/// A Cache without a UID (never persisted) owns nothing.
pub fn owned_by(cache: &Cache, candidates: Vec<Deployment>) -> Vec<Deployment> {
    let Some(uid) = cache.metadata.uid.as_deref() else {
        return Vec::new();
    };

    candidates
        .into_iter()
        .filter(|candidate| is_owned_by_uid(candidate, uid))
        .collect()
}
