//! Infrastructure Layer - External concerns and implementations
//!
//! This module handles forge APIs, the catalog file store, caching and the
//! concurrency primitives used by the batch runner.

pub mod cache;
pub mod repositories;
pub mod repository_source;
pub mod resilience;
pub mod worker_pool;

pub use cache::*;
pub use repositories::*;
pub use repository_source::*;
pub use resilience::*;
pub use worker_pool::*;
