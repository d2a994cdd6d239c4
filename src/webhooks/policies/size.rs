//! Desired size policy.
//!
//! Tier 1 (Critical): Always enforced

use super::{ValidationContext, ValidationResult};

/// Smallest accepted `desiredSize`
pub const MIN_SIZE: i32 = 1;

/// Reject Caches that ask for fewer than [`MIN_SIZE`] replicas
pub fn validate(ctx: &ValidationContext<'_>) -> ValidationResult {
    let size = ctx.cache.spec.desired_size;
    if size < MIN_SIZE {
        return ValidationResult::denied(
            "InvalidSize",
            &format!("desiredSize must be at least {}, got {}", MIN_SIZE, size),
        );
    }
    ValidationResult::allowed()
}
