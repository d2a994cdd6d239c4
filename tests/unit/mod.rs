// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for cache-operator.
//!
//! These tests run without a Kubernetes cluster and exercise the public API
//! of each component in isolation.

#[path = "../common/fixtures.rs"]
mod fixtures;

mod crd_tests {
    use cache_operator::crd::{Cache, CachePhase, ConditionStatus, Engine};
    use kube::CustomResourceExt;

    #[test]
    fn test_spec_wire_format() {
        let cache: Cache = serde_json::from_value(serde_json::json!({
            "apiVersion": "cache.kuroboros.io/v1beta1",
            "kind": "Cache",
            "metadata": { "name": "sessions", "namespace": "default" },
            "spec": {
                "engine": "memcached",
                "engineVersion": "latest",
                "desiredSize": 2,
                "resources": {
                    "requests": { "cpu": "100m", "memory": "64Mi" },
                    "limits": { "cpu": "1", "memory": "128Mi" }
                }
            },
            "status": {
                "phase": "Healthy",
                "currentSize": 2,
                "conditions": [{
                    "type": "Ready",
                    "status": "True",
                    "reason": "DesiredReached",
                    "message": "Desired match current",
                    "lastTransitionTime": "2024-01-01T00:00:00Z"
                }]
            }
        }))
        .expect("cache should deserialize");

        assert_eq!(cache.spec.engine, Engine::Memcached);
        assert_eq!(cache.spec.desired_size, 2);
        assert_eq!(cache.spec.resources.unwrap().limits.memory, "128Mi");

        let status = cache.status.unwrap();
        assert_eq!(status.phase, CachePhase::Healthy);
        assert_eq!(status.conditions[0].status, ConditionStatus::True);
    }

    #[test]
    fn test_crd_generation() {
        let crd = Cache::crd();
        assert_eq!(crd.spec.group, "cache.kuroboros.io");
        assert_eq!(crd.spec.names.kind, "Cache");
        assert_eq!(crd.spec.names.plural, "caches");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions[0].name, "v1beta1");
        assert!(crd.spec.versions[0].subresources.is_some());
    }
}

mod resource_tests {
    use crate::fixtures::CacheBuilder;
    use cache_operator::crd::Engine;
    use cache_operator::resources::common::{
        ENGINE_LABEL, INSTANCE_LABEL, engine_selector, owner_reference,
    };
    use cache_operator::resources::deployment::{deployment_name, generate_deployment};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    #[test]
    fn test_two_caches_of_one_engine_select_distinct_pods() {
        let a = generate_deployment(&CacheBuilder::new("a").engine(Engine::Valkey).build());
        let b = generate_deployment(&CacheBuilder::new("b").engine(Engine::Valkey).build());

        let selector = |d: &k8s_openapi::api::apps::v1::Deployment| {
            d.spec.as_ref().unwrap().selector.match_labels.clone().unwrap()
        };
        assert_ne!(selector(&a), selector(&b));
        assert_eq!(selector(&a)[ENGINE_LABEL], selector(&b)[ENGINE_LABEL]);
        assert_eq!(selector(&a)[INSTANCE_LABEL], "a");
    }

    #[test]
    fn test_deployment_is_listed_by_engine_selector() {
        let cache = CacheBuilder::new("sessions").engine(Engine::Memcached).build();
        let deployment = generate_deployment(&cache);
        let labels = deployment.metadata.labels.unwrap();

        let (key, value) = engine_selector(&cache)
            .split_once('=')
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .unwrap();
        assert_eq!(labels.get(&key), Some(&value));
    }

    #[test]
    fn test_owner_reference_marks_controller() {
        let cache = CacheBuilder::new("sessions").build();
        let owner = owner_reference(&cache);
        assert_eq!(owner.uid, "uid-sessions");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
        assert_eq!(deployment_name(&cache), "sessions-deployment");
    }

    #[test]
    fn test_resources_copied() {
        let cache = CacheBuilder::new("sessions").resources("250m", "512Mi").build();
        let deployment = generate_deployment(&cache);
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        let resources = pod.containers[0].resources.clone().unwrap();
        assert_eq!(
            resources.requests.unwrap()["cpu"],
            Quantity("250m".to_string())
        );
        assert_eq!(
            resources.limits.unwrap()["memory"],
            Quantity("512Mi".to_string())
        );
    }
}

mod ownership_tests {
    use crate::fixtures::{CacheBuilder, deployment_owned_by, owned_deployment};
    use cache_operator::controller::ownership::{is_owned_by_uid, owned_by};
    use kube::ResourceExt;

    #[test]
    fn test_generated_deployment_is_owned() {
        let cache = CacheBuilder::new("sessions").build();
        let child = owned_deployment(&cache, 1, Some(1));
        assert!(is_owned_by_uid(&child, "uid-sessions"));
        assert_eq!(owned_by(&cache, vec![child]).len(), 1);
    }

    #[test]
    fn test_mixed_candidates() {
        let cache = CacheBuilder::new("sessions").build();
        let candidates = vec![
            deployment_owned_by("foreign", &["uid-other"]),
            owned_deployment(&cache, 1, None),
            deployment_owned_by("orphan", &[]),
        ];
        let owned: Vec<String> = owned_by(&cache, candidates)
            .iter()
            .map(|d| d.name_any())
            .collect();
        assert_eq!(owned, vec!["sessions-deployment"]);
    }
}

mod status_tests {
    use cache_operator::controller::status::{
        find_condition, get_condition_reason, is_condition_true, upsert_condition,
    };
    use cache_operator::crd::{CONDITION_READY, ConditionStatus};

    #[test]
    fn test_ready_condition_lifecycle() {
        let mut conditions = Vec::new();

        assert!(upsert_condition(
            &mut conditions,
            CONDITION_READY,
            ConditionStatus::False,
            "Progressing",
            "Desired dont match current",
        ));
        assert!(!is_condition_true(&conditions, CONDITION_READY));

        assert!(!upsert_condition(
            &mut conditions,
            CONDITION_READY,
            ConditionStatus::False,
            "Progressing",
            "Desired dont match current",
        ));

        assert!(upsert_condition(
            &mut conditions,
            CONDITION_READY,
            ConditionStatus::True,
            "DesiredReached",
            "Desired match current",
        ));
        assert!(is_condition_true(&conditions, CONDITION_READY));
        assert_eq!(
            get_condition_reason(&conditions, CONDITION_READY),
            Some("DesiredReached")
        );
        assert_eq!(conditions.len(), 1);
        assert!(find_condition(&conditions, "Missing").is_none());
    }
}

mod webhook_tests {
    use crate::fixtures::CacheBuilder;
    use cache_operator::crd::Engine;
    use cache_operator::webhooks::mutation::{OWNER_LABEL, owner_label_patch};
    use cache_operator::webhooks::policies::{ValidationContext, validate_all};

    fn validate(
        cache: &cache_operator::crd::Cache,
        old: Option<&cache_operator::crd::Cache>,
    ) -> cache_operator::webhooks::ValidationResult {
        validate_all(&ValidationContext {
            cache,
            old_cache: old,
        })
    }

    #[test]
    fn test_version_allow_list() {
        let ok = CacheBuilder::new("c").engine(Engine::Redis).engine_version("7.1").build();
        assert!(validate(&ok, None).allowed);

        let bad = CacheBuilder::new("c").engine(Engine::Valkey).engine_version("8.0").build();
        let result = validate(&bad, None);
        assert!(!result.allowed);
        assert_eq!(
            result.message.as_deref(),
            Some("8.0 is not a valid version for valkey")
        );
    }

    #[test]
    fn test_size_lower_bound() {
        let zero = CacheBuilder::new("c").desired_size(0).build();
        assert_eq!(validate(&zero, None).reason.as_deref(), Some("InvalidSize"));
    }

    #[test]
    fn test_engine_immutable() {
        let old = CacheBuilder::new("c").engine(Engine::Redis).build();
        let new = CacheBuilder::new("c").engine(Engine::Memcached).build();
        let result = validate(&new, Some(&old));
        assert_eq!(
            result.message.as_deref(),
            Some("Cannot change an already created engine (redis -> memcached)")
        );

        let resized = CacheBuilder::new("c").engine(Engine::Redis).desired_size(4).build();
        assert!(validate(&resized, Some(&old)).allowed);
    }

    #[test]
    fn test_owner_patch_targets_label() {
        let cache = CacheBuilder::new("c").label("team", "payments").build();
        let ops = owner_label_patch(&cache, "bob");
        let rendered = serde_json::to_value(&ops).unwrap();
        assert_eq!(rendered[0]["op"], "add");
        assert_eq!(
            rendered[0]["path"],
            format!("/metadata/labels/{}", OWNER_LABEL)
        );
        assert_eq!(rendered[0]["value"], "bob");
    }
}

mod config_tests {
    use cache_operator::config::OperatorConfig;

    #[test]
    fn test_scope_from_lookup() {
        let config = OperatorConfig::from_lookup(|key| match key {
            "POD_NAME" => Some("op-0".to_string()),
            "WATCH_NAMESPACE" => Some("caches".to_string()),
            _ => None,
        });
        assert_eq!(config.pod_name, "op-0");
        assert_eq!(config.pod_namespace, "default");
        assert_eq!(config.scope(), "caches");
    }
}
