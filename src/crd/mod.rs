//! Custom Resource Definitions (CRDs) for cache-operator.
//!
//! - `Cache`: a deployed in-memory cache engine (redis, valkey or memcached)

mod cache;

pub use cache::*;
