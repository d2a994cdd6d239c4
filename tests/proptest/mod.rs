// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for cache-operator.
//!
//! Uses proptest to generate random inputs and verify invariants.

#[path = "../common/fixtures.rs"]
mod fixtures;

use std::collections::HashSet;

use proptest::prelude::*;

use cache_operator::controller::ownership::owned_by;
use cache_operator::controller::state_machine::{ReconcileStep, determine_step, observe_health};
use cache_operator::controller::status::upsert_condition;
use cache_operator::crd::{CachePhase, Condition, ConditionStatus, Engine};
use cache_operator::resources::deployment::generate_deployment;
use kube::ResourceExt;

use fixtures::{CacheBuilder, deployment_owned_by};

/// Strategy for generating engines.
fn any_engine() -> impl Strategy<Value = Engine> {
    prop_oneof![
        Just(Engine::Redis),
        Just(Engine::Valkey),
        Just(Engine::Memcached),
    ]
}

/// Strategy for generating condition statuses.
fn any_condition_status() -> impl Strategy<Value = ConditionStatus> {
    prop_oneof![
        Just(ConditionStatus::True),
        Just(ConditionStatus::False),
        Just(ConditionStatus::Unknown),
    ]
}

/// Strategy for a small pool of UIDs so collisions are common.
fn uid() -> impl Strategy<Value = String> {
    (0..4u8).prop_map(|n| format!("uid-{}", n))
}

/// Candidate Deployments, each with zero to three owner references.
fn candidates() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec(uid(), 0..3), 0..8)
}

/// Upserts drawn from a few types and reasons.
fn upserts() -> impl Strategy<Value = Vec<(String, ConditionStatus, String)>> {
    prop::collection::vec(
        (
            prop_oneof![Just("Ready"), Just("Degraded"), Just("Scaling")].prop_map(String::from),
            any_condition_status(),
            prop_oneof![Just("A"), Just("B"), Just("C")].prop_map(String::from),
        ),
        0..20,
    )
}

fn apply(conditions: &mut Vec<Condition>, ops: &[(String, ConditionStatus, String)]) {
    for (condition_type, status, reason) in ops {
        upsert_condition(conditions, condition_type, *status, reason, "message");
    }
}

proptest! {
    /// Property: the ownership filter keeps exactly the candidates with a
    /// matching owner UID, in order.
    #[test]
    fn test_owned_by_is_exact(owners in candidates(), cache_uid in uid()) {
        let cache = CacheBuilder::new("c").uid(Some(cache_uid.as_str())).build();
        let deployments: Vec<_> = owners
            .iter()
            .enumerate()
            .map(|(i, uids)| {
                let refs: Vec<&str> = uids.iter().map(String::as_str).collect();
                deployment_owned_by(&format!("d{}", i), &refs)
            })
            .collect();

        let expected: Vec<String> = owners
            .iter()
            .enumerate()
            .filter(|(_, uids)| uids.contains(&cache_uid))
            .map(|(i, _)| format!("d{}", i))
            .collect();
        let actual: Vec<String> = owned_by(&cache, deployments)
            .iter()
            .map(|d| d.name_any())
            .collect();

        prop_assert_eq!(actual, expected);
    }

    /// Property: a Cache always owns the Deployment generated for it.
    #[test]
    fn test_generated_deployment_is_owned(engine in any_engine(), size in 1..50i32) {
        let cache = CacheBuilder::new("c").engine(engine).desired_size(size).build();
        let owned = owned_by(&cache, vec![generate_deployment(&cache)]);
        prop_assert_eq!(owned.len(), 1);
        prop_assert_eq!(owned[0].spec.as_ref().unwrap().replicas, Some(size));
    }

    /// Property: at most one condition per type, whatever the upsert sequence.
    #[test]
    fn test_upsert_keeps_types_unique(ops in upserts()) {
        let mut conditions = Vec::new();
        apply(&mut conditions, &ops);

        let types: HashSet<&str> = conditions.iter().map(|c| c.r#type.as_str()).collect();
        prop_assert_eq!(types.len(), conditions.len());
    }

    /// Property: replaying the same upsert sequence changes nothing.
    #[test]
    fn test_upsert_is_idempotent(ops in upserts()) {
        let mut conditions = Vec::new();
        apply(&mut conditions, &ops);
        let first = conditions.clone();

        // Only the last upsert per type decides the outcome, and it is a no-op now
        let mut last: Vec<(String, ConditionStatus, String)> = Vec::new();
        for op in ops.iter().rev() {
            if !last.iter().any(|(t, _, _)| *t == op.0) {
                last.push(op.clone());
            }
        }
        for (condition_type, status, reason) in &last {
            let changed = upsert_condition(&mut conditions, condition_type, *status, reason, "message");
            prop_assert!(!changed);
        }
        prop_assert_eq!(first, conditions);
    }

    /// Property: Healthy exactly when available replicas match the desired size.
    #[test]
    fn test_phase_converges(desired in 1..20i32, available in 0..20i32) {
        let observation = observe_health(desired, available);
        if desired == available {
            prop_assert_eq!(observation.phase, CachePhase::Healthy);
            prop_assert_eq!(observation.status, ConditionStatus::True);
        } else {
            prop_assert_eq!(observation.phase, CachePhase::Progressing);
            prop_assert_eq!(observation.status, ConditionStatus::False);
        }
    }

    /// Property: the finalizer is never released while children remain, and
    /// nothing is created for a Cache that is being deleted.
    #[test]
    fn test_finalizer_outlives_children(
        deleting in any::<bool>(),
        finalizer in any::<bool>(),
        initialized in any::<bool>(),
        has_children in any::<bool>(),
    ) {
        let mut builder = CacheBuilder::new("c");
        if deleting { builder = builder.deleting(); }
        if finalizer { builder = builder.with_finalizer(); }
        if initialized { builder = builder.initialized(); }
        let step = determine_step(&builder.build(), has_children);

        if has_children {
            prop_assert_ne!(step, ReconcileStep::ReleaseFinalizer);
        }
        if deleting {
            prop_assert!(matches!(
                step,
                ReconcileStep::DeleteChildren | ReconcileStep::ReleaseFinalizer | ReconcileStep::Forget
            ));
        } else {
            prop_assert!(!matches!(
                step,
                ReconcileStep::DeleteChildren | ReconcileStep::ReleaseFinalizer | ReconcileStep::Forget
            ));
        }
    }
}
