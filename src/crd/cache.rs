//! Cache Custom Resource Definition.
//!
//! A `Cache` declares an in-memory cache engine to run inside the cluster.
//! The operator realizes it as a single Deployment owned by the Cache and
//! reports replica health back through the status sub-resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cache is a custom resource for deploying a cache engine.
///
/// Example:
/// ```yaml
/// apiVersion: cache.kuroboros.io/v1beta1
/// kind: Cache
/// metadata:
///   name: sessions
/// spec:
///   engine: valkey
///   engineVersion: latest
///   desiredSize: 3
///   resources:
///     requests: { cpu: 100m, memory: 256Mi }
///     limits: { cpu: "1", memory: 1Gi }
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cache.kuroboros.io",
    version = "v1beta1",
    kind = "Cache",
    plural = "caches",
    status = "CacheStatus",
    namespaced,
    printcolumn = r#"{"name":"Engine", "type":"string", "jsonPath":".spec.engine"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.engineVersion"}"#,
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".spec.desiredSize"}"#,
    printcolumn = r#"{"name":"Current", "type":"integer", "jsonPath":".status.currentSize"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CacheSpec {
    /// The engine that will be deployed.
    pub engine: Engine,

    /// The tag to use in the engine deployment image.
    pub engine_version: String,

    /// The desired number of replicas of the deployment.
    #[schemars(range(min = 1))]
    pub desired_size: i32,

    /// Requests and limits copied onto the engine container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<CacheResources>,
}

/// Supported cache engines.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Redis,
    Valkey,
    Memcached,
}

impl Engine {
    /// Every engine, in declaration order.
    pub const ALL: [Engine; 3] = [Engine::Redis, Engine::Valkey, Engine::Memcached];

    /// Lowercase engine name, as used in labels and container names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Redis => "redis",
            Engine::Valkey => "valkey",
            Engine::Memcached => "memcached",
        }
    }

    /// Image repository the engine container is pulled from.
    pub fn image_repository(&self) -> &'static str {
        match self {
            Engine::Redis => "redis",
            Engine::Valkey => "valkey/valkey",
            Engine::Memcached => "memcached",
        }
    }

    /// Port the engine listens on.
    pub fn port(&self) -> i32 {
        match self {
            Engine::Redis | Engine::Valkey => 6379,
            Engine::Memcached => 11211,
        }
    }

    /// Versions (image tags) accepted by the admission webhook.
    pub fn allowed_versions(&self) -> &'static [&'static str] {
        match self {
            Engine::Redis => &["7.1", "latest"],
            Engine::Valkey => &["latest"],
            Engine::Memcached => &["latest"],
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits and requests of resources for the Cache.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheResources {
    pub requests: ResourceSpec,
    pub limits: ResourceSpec,
}

/// CPU and memory quantities, kept as the user wrote them.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    pub cpu: String,
    pub memory: String,
}

/// Status of a Cache. Written only by the operator.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    /// Coarse lifecycle phase.
    #[serde(default)]
    pub phase: CachePhase,

    /// Available replicas last observed on the owned Deployment.
    #[serde(default)]
    #[schemars(range(min = 0))]
    pub current_size: i32,

    /// Conditions keyed by `type`; at most one entry per type.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl CacheStatus {
    /// Status written on first sight of a Cache.
    pub fn initial() -> Self {
        Self {
            phase: CachePhase::Progressing,
            current_size: 0,
            conditions: Vec::new(),
        }
    }
}

/// CachePhase represents the lifecycle phase of a Cache.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum CachePhase {
    /// Replicas are being created or do not match the desired size.
    #[default]
    Progressing,
    /// Available replicas match the desired size.
    Healthy,
}

impl std::fmt::Display for CachePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CachePhase::Progressing => write!(f, "Progressing"),
            CachePhase::Healthy => write!(f, "Healthy"),
        }
    }
}

/// Condition describes one aspect of the Cache at a point in time.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (the key).
    pub r#type: String,
    /// Status of the condition.
    pub status: ConditionStatus,
    /// Machine-readable reason for the last transition.
    pub reason: String,
    /// Human-readable message about the last transition.
    pub message: String,
    /// RFC 3339 time of the last reason change.
    pub last_transition_time: String,
}

/// Tri-state condition status.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition type reporting whether the Cache serves at its desired size.
pub const CONDITION_READY: &str = "Ready";
