//! Engine version policy.
//!
//! Tier 1 (Critical): Always enforced
//!
//! Each engine only accepts the image tags in its allow-list.

use super::{ValidationContext, ValidationResult};

/// Reject versions outside the engine's allow-list
pub fn validate(ctx: &ValidationContext<'_>) -> ValidationResult {
    let engine = ctx.cache.spec.engine;
    let version = ctx.cache.spec.engine_version.as_str();

    if engine.allowed_versions().contains(&version) {
        ValidationResult::allowed()
    } else {
        ValidationResult::denied(
            "InvalidEngineVersion",
            &format!("{} is not a valid version for {}", version, engine),
        )
    }
}
