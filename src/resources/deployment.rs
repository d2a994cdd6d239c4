//! Deployment generation for Cache resources.
//!
//! The manifest is a pure function of the Cache: the same object always
//! yields the same Deployment, so a repeated create is rejected by the API
//! server as AlreadyExists instead of producing a second workload.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use super::common::{owner_reference, selector_labels, standard_labels};
use crate::crd::{Cache, ResourceSpec};

/// Name of the Deployment owned by a Cache.
pub fn deployment_name(cache: &Cache) -> String {
    format!("{}-deployment", cache.name_any())
}

/// Container image reference for the Cache's engine and version.
pub fn engine_image(cache: &Cache) -> String {
    format!(
        "{}:{}",
        cache.spec.engine.image_repository(),
        cache.spec.engine_version
    )
}

fn quantities(spec: &ResourceSpec) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(spec.cpu.clone())),
        ("memory".to_string(), Quantity(spec.memory.clone())),
    ])
}

/// Generate the Deployment for a Cache
pub fn generate_deployment(cache: &Cache) -> Deployment {
    let engine = cache.spec.engine;

    Deployment {
        metadata: ObjectMeta {
            name: Some(deployment_name(cache)),
            namespace: cache.namespace(),
            labels: Some(standard_labels(cache)),
            owner_references: Some(vec![owner_reference(cache)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(cache.spec.desired_size),
            selector: LabelSelector {
                match_labels: Some(selector_labels(cache)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels(cache)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: format!("{}-container", engine),
                        image: Some(engine_image(cache)),
                        ports: Some(vec![ContainerPort {
                            container_port: engine.port(),
                            ..Default::default()
                        }]),
                        resources: cache.spec.resources.as_ref().map(|r| {
                            ResourceRequirements {
                                requests: Some(quantities(&r.requests)),
                                limits: Some(quantities(&r.limits)),
                                ..Default::default()
                            }
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
