//! Read-through caching decorator for repository sources

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::ttl_cache::TtlCache;
use crate::domain::{RepositoryIdentity, RepositorySnapshot};
use crate::infrastructure::repository_source::{RepositorySourceClient, RepositorySourceResult};

pub type SnapshotCache = TtlCache<RepositoryIdentity, RepositorySnapshot>;

/// Serves snapshots from a [`SnapshotCache`] and re-fetches through the inner
/// client on miss. Only successful fetches are stored, so a failure never
/// replaces a good entry.
///
/// With single-flight enabled, concurrent misses for the same identity wait on
/// a per-key lock and the first fetch's result is shared through the cache.
pub struct CachingRepositorySource {
    inner: Arc<dyn RepositorySourceClient>,
    cache: Arc<SnapshotCache>,
    single_flight: bool,
    key_locks: Mutex<HashMap<RepositoryIdentity, Arc<Mutex<()>>>>,
}

impl CachingRepositorySource {
    pub fn new(
        inner: Arc<dyn RepositorySourceClient>,
        cache: Arc<SnapshotCache>,
        single_flight: bool,
    ) -> Self {
        Self {
            inner,
            cache,
            single_flight,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    async fn key_lock(&self, identity: &RepositoryIdentity) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the key lock once no other task holds a handle to it
    async fn release_key_lock(&self, identity: &RepositoryIdentity, lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().await;
        // map + ours
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(identity);
        }
    }

    async fn fetch_and_store(
        &self,
        identity: &RepositoryIdentity,
    ) -> RepositorySourceResult<RepositorySnapshot> {
        let snapshot = self.inner.fetch_snapshot(identity).await?;
        self.cache.put(identity.clone(), snapshot.clone()).await;
        Ok(snapshot)
    }
}

#[async_trait]
impl RepositorySourceClient for CachingRepositorySource {
    #[instrument(skip(self), fields(repo = %identity))]
    async fn fetch_snapshot(
        &self,
        identity: &RepositoryIdentity,
    ) -> RepositorySourceResult<RepositorySnapshot> {
        if let Some(hit) = self.cache.get(identity).await {
            debug!(age_secs = hit.age().as_secs(), "snapshot cache hit");
            return Ok(hit.value);
        }

        if !self.single_flight {
            return self.fetch_and_store(identity).await;
        }

        let lock = self.key_lock(identity).await;
        let result = {
            let _guard = lock.lock().await;
            match self.cache.get(identity).await {
                Some(hit) => {
                    debug!("snapshot filled by concurrent fetch");
                    Ok(hit.value)
                }
                None => self.fetch_and_store(identity).await,
            }
        };
        self.release_key_lock(identity, lock).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Platform;
    use crate::infrastructure::repository_source::RepositorySourceError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts upstream calls; fails while `fail` is set
    struct CountingSource {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
        delay: Duration,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
                delay,
            }
        }
    }

    #[async_trait]
    impl RepositorySourceClient for CountingSource {
        async fn fetch_snapshot(
            &self,
            _identity: &RepositoryIdentity,
        ) -> RepositorySourceResult<RepositorySnapshot> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
            tokio::time::sleep(self.delay).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(RepositorySourceError::Network("connection reset".into()));
            }
            Ok(RepositorySnapshot {
                star_count: 100 + n,
                ..Default::default()
            })
        }
    }

    fn identity() -> RepositoryIdentity {
        RepositoryIdentity::new(Platform::GitHub, "acme", "widget").unwrap()
    }

    fn source(
        inner: Arc<CountingSource>,
        ttl: Duration,
        single_flight: bool,
    ) -> CachingRepositorySource {
        CachingRepositorySource::new(inner, Arc::new(TtlCache::new(ttl)), single_flight)
    }

    #[tokio::test(start_paused = true)]
    async fn serves_from_cache_until_stale() {
        let inner = Arc::new(CountingSource::new(Duration::ZERO));
        let cached = source(inner.clone(), Duration::from_secs(600), false);

        let first = cached.fetch_snapshot(&identity()).await.unwrap();
        let second = cached.fetch_snapshot(&identity()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(600)).await;
        let third = cached.fetch_snapshot(&identity()).await.unwrap();
        assert_eq!(third.star_count, 101);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_is_not_cached() {
        let inner = Arc::new(CountingSource::new(Duration::ZERO));
        let cached = source(inner.clone(), Duration::from_secs(600), true);

        cached.fetch_snapshot(&identity()).await.unwrap();
        tokio::time::advance(Duration::from_secs(601)).await;

        inner.fail.store(true, Ordering::SeqCst);
        assert!(cached.fetch_snapshot(&identity()).await.is_err());
        assert!(cached.cache().get(&identity()).await.is_none());

        inner.fail.store(false, Ordering::SeqCst);
        let recovered = cached.fetch_snapshot(&identity()).await.unwrap();
        assert_eq!(recovered.star_count, 102);
    }

    #[tokio::test(start_paused = true)]
    async fn single_flight_coalesces_concurrent_misses() {
        let inner = Arc::new(CountingSource::new(Duration::from_millis(50)));
        let cached = source(inner.clone(), Duration::from_secs(600), true);

        let id = identity();
        let (a, b, c) = tokio::join!(
            cached.fetch_snapshot(&id),
            cached.fetch_snapshot(&id),
            cached.fetch_snapshot(&id)
        );
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(c.unwrap().star_count, 100);
        assert!(cached.key_locks.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn without_single_flight_misses_fetch_in_parallel() {
        let inner = Arc::new(CountingSource::new(Duration::from_millis(50)));
        let cached = source(inner.clone(), Duration::from_secs(600), false);

        let id = identity();
        let (a, b) = tokio::join!(cached.fetch_snapshot(&id), cached.fetch_snapshot(&id));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
