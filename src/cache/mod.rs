// Cache module with in-memory fallback when Redis is not configured

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

pub mod keys;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
}

#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Deletes every key matching a glob pattern where `*` matches any run of
    /// characters. Returns how many keys were removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;
}

/// Reads and deserializes a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn CacheBackend,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serializes and stores a JSON value.
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn CacheBackend,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, &raw, ttl).await
}

/// The set of cached views a mutation makes stale.
///
/// Callers say which keys and key patterns to drop; how a pattern is matched
/// is left to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationSet {
    keys: BTreeSet<String>,
    patterns: BTreeSet<String>,
}

impl InvalidationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.keys.insert(key.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.insert(pattern.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.patterns.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }

    /// Drops every listed key and pattern. Keeps going after a failure and
    /// reports the first error.
    pub async fn apply(&self, cache: &dyn CacheBackend) -> Result<(), CacheError> {
        let mut first_error = None;

        for key in &self.keys {
            if let Err(err) = cache.delete(key).await {
                warn!(key = %key, error = %err, "cache invalidation failed");
                first_error.get_or_insert(err);
            }
        }
        for pattern in &self.patterns {
            match cache.delete_pattern(pattern).await {
                Ok(removed) => debug!(pattern = %pattern, removed, "invalidated cache pattern"),
                Err(err) => {
                    warn!(pattern = %pattern, error = %err, "cache invalidation failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// In-memory cache implementation as fallback
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            Instant::now() > expires_at
        } else {
            false
        }
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::OperationFailed("cache lock poisoned".to_string())
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().map(|store| store.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        {
            let store = self.store.read().map_err(poisoned)?;
            match store.get(key) {
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: evict lazily.
        self.store.write().map_err(poisoned)?.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(poisoned)?;
        store.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut store = self.store.write().map_err(poisoned)?;
        let before = store.len();
        store.retain(|key, _| !glob_match(pattern, key));
        Ok((before - store.len()) as u64)
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Redis-backed cache. Pattern deletes walk the keyspace with `SCAN` so a
/// large cache never blocks the server the way `KEYS` would.
#[derive(Clone)]
pub struct RedisCache {
    client: Arc<redis::Client>,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub fn from_client(client: Arc<redis::Client>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.client.get_async_connection().await?;
        let result: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.client.get_async_connection().await?;
        if let Some(ttl) = ttl {
            redis::cmd("SETEX")
                .arg(key)
                .arg(ttl.as_secs().max(1))
                .arg(value)
                .query_async::<_, ()>(&mut conn)
                .await?;
        } else {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.client.get_async_connection().await?;
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.client.get_async_connection().await?;
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += deleted;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }
}

// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// "in-memory" or "redis"
    pub backend: String,
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "in-memory".to_string(),
            redis_url: None,
        }
    }
}

// Cache factory
pub struct CacheFactory;

impl CacheFactory {
    pub fn create_cache(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>, CacheError> {
        match (config.backend.to_ascii_lowercase().as_str(), &config.redis_url) {
            ("redis", Some(url)) => Ok(Arc::new(RedisCache::new(url)?)),
            ("redis", None) => {
                warn!("Redis cache selected without a redis_url, falling back to in-memory cache");
                Ok(Arc::new(InMemoryCache::new()))
            }
            _ => Ok(Arc::new(InMemoryCache::new())),
        }
    }
}

/// Glob match supporting `*` only, the subset both backends agree on.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let p = pattern.as_bytes();
    let c = candidate.as_bytes();
    let (mut pi, mut ci) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ci < c.len() {
        if pi < p.len() && p[pi] != b'*' && p[pi] == c[ci] {
            pi += 1;
            ci += 1;
        } else if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            mark = ci;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ci = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_prefix_and_infix_wildcards() {
        assert!(glob_match("coupons:*", "coupons:page:1"));
        assert!(glob_match("coupons:*", "coupons:"));
        assert!(!glob_match("coupons:*", "coupon:1"));
        assert!(glob_match("coupon_validation:SAVE20:*", "coupon_validation:SAVE20:abc"));
        assert!(!glob_match("coupon_validation:SAVE20:*", "coupon_validation:SAVE2:abc"));
        assert!(glob_match("a*c*e", "abcde"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test]
    async fn in_memory_round_trip_and_expiry() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache
            .set("short", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalidation_set_drops_keys_and_patterns() {
        let cache = InMemoryCache::new();
        for key in ["coupon:1", "coupons:all", "coupons:page:2", "cart_totals:u1"] {
            cache.set(key, "x", None).await.unwrap();
        }

        InvalidationSet::new()
            .key("coupon:1")
            .pattern("coupons:*")
            .apply(&cache)
            .await
            .unwrap();

        assert_eq!(cache.get("coupon:1").await.unwrap(), None);
        assert_eq!(cache.get("coupons:all").await.unwrap(), None);
        assert_eq!(cache.get("coupons:page:2").await.unwrap(), None);
        assert_eq!(cache.get("cart_totals:u1").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn json_helpers_round_trip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Snapshot {
            total: String,
        }

        let cache = InMemoryCache::new();
        let value = Snapshot {
            total: "12.50".into(),
        };
        set_json(&cache, "snap", &value, None).await.unwrap();
        let back: Option<Snapshot> = get_json(&cache, "snap").await.unwrap();
        assert_eq!(back, Some(value));
    }
}
