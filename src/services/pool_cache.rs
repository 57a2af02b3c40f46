use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{error::AppResult, models::RecommendationPool};

/// Seeds kept in a pool signature
pub const MAX_SIGNATURE_SEEDS: usize = 60;

/// A cached pool must hold at least this many items (or the full requested
/// size, if smaller) to be served
pub const MIN_SERVABLE_POOL: usize = 24;

/// Sorted non-blank seeds, truncated and comma joined
pub fn seed_signature(seeds: &[String]) -> String {
    let mut sorted: Vec<&str> = seeds
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    sorted.sort_unstable();
    sorted.truncate(MAX_SIGNATURE_SEEDS);
    sorted.join(",")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub username: String,
    pub signature: String,
}

impl PoolKey {
    pub fn new(username: &str, seeds: &[String]) -> Self {
        Self {
            username: username.to_string(),
            signature: seed_signature(seeds),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub pool: Arc<RecommendationPool>,
    pub built_at: Instant,
}

/// Storage behind the pool cache
///
/// Entries are replaced whole; freshness is judged by [`PoolCache`].
#[async_trait::async_trait]
pub trait PoolStore: Send + Sync {
    async fn get(&self, key: &PoolKey) -> Option<PoolEntry>;
    async fn insert(&self, key: PoolKey, entry: PoolEntry);
}

/// Bounded in-process pool storage
pub struct MokaPoolStore {
    cache: moka::future::Cache<PoolKey, PoolEntry>,
}

impl MokaPoolStore {
    /// `ttl` only drives eviction; staleness is checked on read
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl.saturating_mul(2))
            .build();
        Self { cache }
    }
}

#[async_trait::async_trait]
impl PoolStore for MokaPoolStore {
    async fn get(&self, key: &PoolKey) -> Option<PoolEntry> {
        self.cache.get(key).await
    }

    async fn insert(&self, key: PoolKey, entry: PoolEntry) {
        self.cache.insert(key, entry).await;
    }
}

/// TTL cache of recommendation pools keyed by user and seed signature
pub struct PoolCache {
    store: Arc<dyn PoolStore>,
    ttl: Duration,
    in_flight: DashMap<PoolKey, Arc<Mutex<()>>>,
}

impl PoolCache {
    pub fn new(store: Arc<dyn PoolStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            in_flight: DashMap::new(),
        }
    }

    async fn fresh(&self, key: &PoolKey, pool_size: usize) -> Option<Arc<RecommendationPool>> {
        let entry = self.store.get(key).await?;
        let min_len = MIN_SERVABLE_POOL.min(pool_size);

        if entry.built_at.elapsed() < self.ttl && entry.pool.len() >= min_len {
            Some(entry.pool)
        } else {
            None
        }
    }

    /// Returns the cached pool for `(username, seeds)` or builds a new one
    ///
    /// Concurrent misses on one key run `builder` once; the others wait and
    /// then read the stored result. A builder error is returned and nothing
    /// is stored.
    pub async fn get_or_build<F, Fut>(
        &self,
        username: &str,
        seeds: &[String],
        pool_size: usize,
        builder: F,
    ) -> AppResult<Arc<RecommendationPool>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<RecommendationPool>>,
    {
        let key = PoolKey::new(username, seeds);

        if let Some(pool) = self.fresh(&key, pool_size).await {
            tracing::debug!(username = %username, items = pool.len(), "Pool cache hit");
            return Ok(pool.capped(pool_size));
        }

        let lock = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;
        let outcome = self.build_locked(&key, pool_size, builder).await;
        drop(guard);
        drop(lock);

        self.in_flight
            .remove_if(&key, |_, l| Arc::strong_count(l) == 1);

        outcome
    }

    async fn build_locked<F, Fut>(
        &self,
        key: &PoolKey,
        pool_size: usize,
        builder: F,
    ) -> AppResult<Arc<RecommendationPool>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<RecommendationPool>>,
    {
        // another request may have built it while we waited
        if let Some(pool) = self.fresh(key, pool_size).await {
            tracing::debug!(username = %key.username, "Pool built by concurrent request");
            return Ok(pool.capped(pool_size));
        }

        let started = Instant::now();
        let pool = Arc::new(builder().await?);

        tracing::info!(
            username = %key.username,
            items = pool.len(),
            source = %pool.source,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recommendation pool built"
        );

        self.store
            .insert(
                key.clone(),
                PoolEntry {
                    pool: Arc::clone(&pool),
                    built_at: Instant::now(),
                },
            )
            .await;

        Ok(pool.capped(pool_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::test_support::pool_of;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(10800);

    fn cache() -> PoolCache {
        PoolCache::new(Arc::new(MokaPoolStore::new(16, TTL)), TTL)
    }

    fn seeds(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_seed_signature_sorted_and_truncated() {
        assert_eq!(seed_signature(&seeds(&["B", "", "A", " "])), "A,B");

        let many: Vec<String> = (0..100).map(|i| format!("S{:03}", i)).collect();
        let signature = seed_signature(&many);
        assert_eq!(signature.split(',').count(), MAX_SIGNATURE_SEEDS);
        assert!(signature.ends_with("S059"));
    }

    #[test]
    fn test_signature_ignores_seed_order() {
        assert_eq!(
            PoolKey::new("alice", &seeds(&["X", "Y"])),
            PoolKey::new("alice", &seeds(&["Y", "X"]))
        );
        assert_ne!(
            PoolKey::new("alice", &seeds(&["X"])),
            PoolKey::new("bob", &seeds(&["X"]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary() {
        let cache = cache();
        let counter = AtomicUsize::new(0);
        let builds = &counter;
        let build = move || async move {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(pool_of(30))
        };

        let first = cache.get_or_build("alice", &[], 240, build).await.unwrap();

        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        let second = cache.get_or_build("alice", &[], 240, build).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.reasons, first.reasons);
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let third = cache.get_or_build("alice", &[], 240, build).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_small_pool_does_not_satisfy_larger_request() {
        let cache = cache();
        let builds = AtomicUsize::new(0);
        let build = |n: usize| {
            let builds = &builds;
            move || async move {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(pool_of(n))
            }
        };

        cache.get_or_build("alice", &[], 10, build(10)).await.unwrap();
        // 10 >= min(24, 10): hit
        cache.get_or_build("alice", &[], 10, build(10)).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        // 10 < min(24, 240): rebuild
        let pool = cache.get_or_build("alice", &[], 240, build(100)).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len(), 100);
    }

    #[tokio::test]
    async fn test_result_capped_to_pool_size() {
        let cache = cache();
        let pool = cache
            .get_or_build("alice", &[], 50, || async { Ok(pool_of(80)) })
            .await
            .unwrap();
        assert_eq!(pool.len(), 50);
        assert_eq!(pool.reasons.len(), 50);
    }

    #[tokio::test]
    async fn test_builder_error_not_cached() {
        let cache = cache();
        let result = cache
            .get_or_build("alice", &[], 24, || async {
                Err(AppError::Internal("store down".to_string()))
            })
            .await;
        assert!(result.is_err());

        let pool = cache
            .get_or_build("alice", &[], 24, || async { Ok(pool_of(24)) })
            .await
            .unwrap();
        assert_eq!(pool.len(), 24);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_build_once() {
        let cache = Arc::new(cache());
        let builds = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let cache = Arc::clone(&cache);
            let builds = Arc::clone(&builds);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_build("alice", &[], 240, || async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(pool_of(40))
                    })
                    .await
            }));
        }

        for task in tasks {
            let pool = task.await.unwrap().unwrap();
            assert_eq!(pool.len(), 40);
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.is_empty());
    }
}
