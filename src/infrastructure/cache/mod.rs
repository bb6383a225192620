//! Caching implementations

pub mod cached_source;
pub mod ttl_cache;

pub use cached_source::{CachingRepositorySource, SnapshotCache};
pub use ttl_cache::{CacheEntry, CacheStats, TtlCache};
