//! Admission webhooks for Cache resources.
//!
//! - Mutation: stamps the creating user as the `owner` label on CREATE
//! - Validation, in tiers:
//!   - Tier 1 (Critical): Always enforced (engine version, desired size)
//!   - Tier 2 (Update): Only on UPDATE operations (engine immutability)

pub mod mutation;
pub mod policies;
mod server;

pub use policies::{ValidationContext, ValidationResult};
pub use server::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, create_webhook_router,
    review_mutation, review_validation, run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
