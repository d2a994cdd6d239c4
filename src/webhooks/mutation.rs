//! Mutation policy for Cache admission requests.
//!
//! On CREATE the requesting user is recorded in the `owner` label. Every
//! other operation passes through unchanged.

use json_patch::{AddOperation, PatchOperation};
use jsonptr::PointerBuf;
use kube::core::admission::{AdmissionRequest, Operation};
use serde_json::{Map, Value};

use crate::crd::Cache;

/// Label recording who created a Cache
pub const OWNER_LABEL: &str = "owner";

/// JSON patch operations to apply to an admitted Cache.
///
/// Empty when nothing needs to change.
pub fn mutation_patch(request: &AdmissionRequest<Cache>) -> Vec<PatchOperation> {
    if request.operation != Operation::Create {
        return Vec::new();
    }
    let Some(cache) = request.object.as_ref() else {
        return Vec::new();
    };
    let Some(username) = request
        .user_info
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
    else {
        return Vec::new();
    };

    owner_label_patch(cache, username)
}

/// Set the owner label, creating `metadata.labels` when the Cache has none
pub fn owner_label_patch(cache: &Cache, username: &str) -> Vec<PatchOperation> {
    let op = if cache.metadata.labels.is_some() {
        AddOperation {
            path: PointerBuf::from_tokens(["metadata", "labels", OWNER_LABEL]),
            value: Value::String(username.to_string()),
        }
    } else {
        AddOperation {
            path: PointerBuf::from_tokens(["metadata", "labels"]),
            value: Value::Object(Map::from_iter([(
                OWNER_LABEL.to_string(),
                Value::String(username.to_string()),
            )])),
        }
    };
    vec![PatchOperation::Add(op)]
}
