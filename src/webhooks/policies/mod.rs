//! Validation policies for Cache admission webhooks.
//!
//! Policies are organized into tiers:
//! - Tier 1 (Critical): Always enforced (engine version, desired size)
//! - Tier 2 (Update): Only enforced on UPDATE operations (immutability)

pub mod engine_version;
pub mod immutability;
pub mod size;

use crate::crd::Cache;

/// Result of a validation check
#[derive(Debug)]
pub struct ValidationResult {
    /// Whether the validation passed
    pub allowed: bool,
    /// Reason for denial (if not allowed)
    pub reason: Option<String>,
    /// Detailed message (if not allowed)
    pub message: Option<String>,
}

impl ValidationResult {
    /// Create an allowed result
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            message: None,
        }
    }

    /// Create a denied result
    pub fn denied(reason: &str, message: &str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        }
    }
}

/// Context for validation
pub struct ValidationContext<'a> {
    /// The Cache being validated
    pub cache: &'a Cache,
    /// The stored Cache (for UPDATE operations)
    pub old_cache: Option<&'a Cache>,
}

impl ValidationContext<'_> {
    /// Check if this is an UPDATE operation
    pub fn is_update(&self) -> bool {
        self.old_cache.is_some()
    }
}

/// Run all validation policies, stopping at the first denial
pub fn validate_all(ctx: &ValidationContext<'_>) -> ValidationResult {
    // An engine swap is reported ahead of the version check
    if ctx.is_update() {
        let result = immutability::validate(ctx);
        if !result.allowed {
            return result;
        }
    }

    for policy in [engine_version::validate, size::validate] {
        let result = policy(ctx);
        if !result.allowed {
            return result;
        }
    }

    ValidationResult::allowed()
}
