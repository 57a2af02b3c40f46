/// Read-through caching on top of [`Cache`](crate::db::Cache).
///
/// Returns the cached value for `$key` when present. Otherwise awaits
/// `$fetch`, propagates its error with `?`, queues the value for a background
/// write with `$ttl` seconds to live, and returns it.
///
/// Errors are never cached, so a failing upstream is retried on the next call.
///
/// # Example
/// ```rust,ignore
/// let books: Vec<BookCandidate> = cached!(
///     self.cache,
///     CacheKey::Similar { region, asin, limit },
///     SIMS_CACHE_TTL,
///     self.fetch_similar_uncached(asin, limit)
/// )?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $fetch:expr) => {{
        let key = $key;
        if let Some(cached) = $cache.get_from_cache(&key).await {
            tracing::debug!(key = %key, "Catalog cache hit");
            Ok(cached)
        } else {
            match $fetch.await {
                Ok(value) => {
                    $cache.set_in_background(&key, &value, $ttl);
                    Ok(value)
                }
                Err(e) => Err(e),
            }
        }
    }};
}
