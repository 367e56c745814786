//! Response cache for GET requests
//!
//! Entries hold already-parsed values behind `Arc<dyn Any>`, so a hit hands
//! back the same instance that was stored. Entries expire after the
//! configured TTL and the least recently used entry is evicted once the size
//! bound is reached.

use crate::config::ClientSettings;
use crate::error::Result;
use crate::types::Params;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type CachedValue = Arc<dyn Any + Send + Sync>;

/// Fingerprint of a request: hex SHA-256 over method, absolute URL and the
/// canonically ordered query parameters.
pub fn cache_key(method: &Method, url: &str, params: &Params) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(url.as_bytes());
    if !params.is_empty() {
        hasher.update(b"|");
        hasher.update(serde_json::to_vec(params)?);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// TTL and size bounded cache of parsed responses
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<String, CachedValue>,
    ttl: Duration,
    max_size: u64,
}

impl ResponseCache {
    /// Create a cache with the given TTL and entry bound
    pub fn new(ttl: Duration, max_size: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_size)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self {
            inner,
            ttl,
            max_size,
        }
    }

    /// Create the cache described by the settings, if caching is enabled
    pub fn from_settings(settings: &ClientSettings) -> Option<Self> {
        settings
            .enable_caching
            .then(|| Self::new(settings.cache_ttl, settings.cache_max_size))
    }

    /// Look up a value of type `T`.
    ///
    /// An entry holding a different type is discarded and reported as a miss.
    pub async fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.inner.get(key).await?;
        match value.downcast::<T>() {
            Ok(hit) => {
                debug!("Cache hit for key {key}");
                Some(hit)
            }
            Err(_) => {
                warn!(
                    "Cached value for key {key} is not a {}, discarding",
                    std::any::type_name::<T>()
                );
                self.inner.invalidate(key).await;
                None
            }
        }
    }

    /// Store a value
    pub async fn put<T: Send + Sync + 'static>(&self, key: String, value: Arc<T>) {
        debug!("Caching response under key {key}");
        self.inner.insert(key, value as CachedValue).await;
    }

    /// Remove one entry
    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Evict expired entries now instead of waiting for maintenance
    pub async fn expire(&self) {
        self.inner.run_pending_tasks().await;
    }

    /// Approximate number of live entries
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Entry time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Maximum number of entries
    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("max_size", &self.max_size)
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_ignores_param_order() {
        let mut a = Params::new();
        a.insert("a".to_string(), json!(1));
        a.insert("b".to_string(), json!(2));

        let mut b = Params::new();
        b.insert("b".to_string(), json!(2));
        b.insert("a".to_string(), json!(1));

        let url = "https://api.example.com/researchProducts";
        assert_eq!(
            cache_key(&Method::GET, url, &a).unwrap(),
            cache_key(&Method::GET, url, &b).unwrap()
        );
    }

    #[test]
    fn test_cache_key_distinguishes_requests() {
        let url = "https://api.example.com/items";
        let mut params = Params::new();
        params.insert("page".to_string(), json!(1));

        let base = cache_key(&Method::GET, url, &params).unwrap();
        assert_eq!(base.len(), 64);

        params.insert("page".to_string(), json!(2));
        assert_ne!(base, cache_key(&Method::GET, url, &params).unwrap());
        assert_ne!(
            cache_key(&Method::GET, url, &Params::new()).unwrap(),
            cache_key(&Method::POST, url, &Params::new()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_get_returns_same_instance() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        let value = Arc::new(json!({"id": "x"}));
        cache.put("k".to_string(), Arc::clone(&value)).await;

        let hit = cache.get::<serde_json::Value>("k").await.unwrap();
        assert!(Arc::ptr_eq(&hit, &value));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss_and_evicts() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        cache.put("k".to_string(), Arc::new(42_u32)).await;

        assert!(cache.get::<String>("k").await.is_none());
        assert!(cache.get::<u32>("k").await.is_none());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = ResponseCache::new(Duration::from_millis(50), 10);
        cache.put("k".to_string(), Arc::new(1_u8)).await;
        assert!(cache.get::<u8>("k").await.is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        cache.expire().await;
        assert!(cache.get::<u8>("k").await.is_none());
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_size_bound_evicts_least_recently_used() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2);
        cache.put("hot".to_string(), Arc::new(0_u32)).await;
        cache.expire().await;

        for i in 1..5_u32 {
            assert!(cache.get::<u32>("hot").await.is_some());
            cache.put(format!("k{i}"), Arc::new(i)).await;
            cache.expire().await;
        }

        assert!(cache.entry_count() <= 2);
        assert_eq!(cache.get::<u32>("hot").await.as_deref(), Some(&0));
    }

    #[test]
    fn test_from_settings() {
        assert!(ResponseCache::from_settings(&ClientSettings::default()).is_none());

        let settings = ClientSettings::builder()
            .caching(Duration::from_secs(5), 3)
            .build()
            .unwrap();
        let cache = ResponseCache::from_settings(&settings).unwrap();
        assert_eq!(cache.ttl(), Duration::from_secs(5));
        assert_eq!(cache.max_size(), 3);
    }
}
