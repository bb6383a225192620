//! In-memory cache with a single time-to-live per instance

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

/// A cached value and the moment it was stored
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired_entries: u64,
    pub writes: u64,
}

/// Whole-entry replacement cache. Entries are never patched: `put` swaps in a
/// new value and restarts its clock, and `get` past the TTL is a miss even when
/// nothing newer exists.
///
/// Uses `tokio::time::Instant` so expiry follows a paused test clock.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    stats: Mutex<CacheStats>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        entry.fetched_at.elapsed() < self.ttl
    }

    /// Fresh entry for `key`, or `None` on miss or expiry
    pub async fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        let lookup = {
            let entries = self.entries.read().await;
            entries
                .get(key)
                .map(|entry| (self.is_fresh(entry), entry.clone()))
        };
        let expired = match lookup {
            Some((true, hit)) => {
                self.stats.lock().await.hits += 1;
                return Some(hit);
            }
            Some((false, _)) => true,
            None => false,
        };

        if expired {
            let mut entries = self.entries.write().await;
            // Another task may have refreshed it in the meantime
            if entries.get(key).is_some_and(|e| !self.is_fresh(e)) {
                entries.remove(key);
                debug!(?key, "evicted expired cache entry");
            }
        }

        let mut stats = self.stats.lock().await;
        stats.misses += 1;
        if expired {
            stats.expired_entries += 1;
        }
        None
    }

    /// Store `value`, replacing any previous entry (last write wins)
    pub async fn put(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            fetched_at: Instant::now(),
        };
        self.entries.write().await.insert(key, entry);
        self.stats.lock().await.writes += 1;
    }

    pub async fn invalidate(&self, key: &K) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| e.fetched_at.elapsed() < ttl);
        let removed = before - entries.len();
        drop(entries);

        if removed > 0 {
            self.stats.lock().await.expired_entries += removed as u64;
            debug!(removed, "purged expired cache entries");
        }
        removed
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test(start_paused = true)]
    async fn get_within_ttl_returns_exact_value() {
        let cache = TtlCache::new(TTL);
        cache.put("acme/widget", 500u64).await;

        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        let hit = cache.get(&"acme/widget").await.unwrap();
        assert_eq!(hit.value, 500);
        assert_eq!(hit.age(), TTL - Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn get_after_ttl_is_a_miss() {
        let cache = TtlCache::new(TTL);
        cache.put("acme/widget", 500u64).await;

        tokio::time::advance(TTL).await;
        assert!(cache.get(&"acme/widget").await.is_none());
        assert!(cache.is_empty().await);

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expired_entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn put_replaces_whole_entry_and_restarts_clock() {
        let cache = TtlCache::new(TTL);
        cache.put("k", 1u64).await;
        tokio::time::advance(Duration::from_secs(500)).await;
        cache.put("k", 2u64).await;
        tokio::time::advance(Duration::from_secs(500)).await;

        assert_eq!(cache.get(&"k").await.map(|e| e.value), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.put("old", 1u64).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.put("new", 2u64).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get(&"new").await.is_some());
    }

    #[tokio::test]
    async fn invalidate_and_stats() {
        let cache = TtlCache::new(TTL);
        assert!(cache.get(&"missing").await.is_none());
        cache.put("k", 1u64).await;
        assert!(cache.get(&"k").await.is_some());
        assert!(cache.invalidate(&"k").await);
        assert!(!cache.invalidate(&"k").await);

        assert_eq!(
            cache.stats().await,
            CacheStats {
                hits: 1,
                misses: 1,
                expired_entries: 0,
                writes: 1,
            }
        );
    }
}
