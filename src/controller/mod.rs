//! Controller module for cache-operator.
//!
//! Contains the reconciliation state machine, the cluster API capability it
//! drives, error handling, and status management.

pub mod cluster_api;
pub mod context;
pub mod error;
pub mod ownership;
pub mod reconciler;
pub mod state_machine;
pub mod status;
