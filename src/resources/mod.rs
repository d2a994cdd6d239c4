//! Resource generation module.
//!
//! Contains utilities for generating Kubernetes resources owned by a Cache.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | Deployment | Runs the cache engine at the desired size |

pub mod common;
pub mod deployment;

// Re-export commonly used items from common
pub use common::{owner_reference, standard_labels};
