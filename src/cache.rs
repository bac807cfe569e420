use moka::future::Cache;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub cache_size: u64,
    pub ttl_seconds: u64,
}

/// Time-to-live cache for provider responses. Entries expire purely by age;
/// there is no size bound and stale entries are only dropped when touched.
pub struct WeatherCache<V> {
    cache: Cache<String, V>,
    ttl: Duration,
}

impl<V> WeatherCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).build();

        Self { cache, ttl }
    }

    /// The stored value, unless it is older than the configured TTL.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.cache.get(key).await
    }

    pub async fn set(&self, key: String, value: V) {
        self.cache.insert(key, value).await;
    }

    /// Counts live entries. moka's pending maintenance runs first, so entries
    /// past their TTL are purged here as well as on lookup.
    pub async fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks().await;

        CacheStats {
            cache_size: self.cache.entry_count(),
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}
