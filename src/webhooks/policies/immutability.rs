//! Immutability validation policy.
//!
//! Tier 2 (Update): Only enforced on UPDATE operations
//!
//! The engine of a Cache is fixed at creation; switching it would leave the
//! existing Deployment running the old image under a new selector.

use super::{ValidationContext, ValidationResult};

/// Validate immutability constraints on UPDATE operations
pub fn validate(ctx: &ValidationContext<'_>) -> ValidationResult {
    let Some(old) = ctx.old_cache else {
        return ValidationResult::allowed();
    };

    let (from, to) = (old.spec.engine, ctx.cache.spec.engine);
    if from != to {
        return ValidationResult::denied(
            "EngineImmutable",
            &format!("Cannot change an already created engine ({} -> {})", from, to),
        );
    }

    ValidationResult::allowed()
}
