//! Process-local exchange cache backed by a concurrent map
//!
//! Lookups, stores, and evictions race freely across in-flight requests;
//! DashMap's sharded locking keeps them consistent without a global lock.
//! Expiry is lazy on lookup, with an optional periodic sweep a host can
//! spawn alongside the orchestrator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::cache::TokenCache;

/// Leading slice of a key for trace output; keys are normally hex
/// fingerprints, but arbitrary strings must not panic on a char boundary
fn key_prefix(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    token: String,
    expires_at: Instant,
}

/// In-memory token cache with per-entry absolute deadlines
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired or not (for tests/metrics)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TokenCache for InMemoryCache {
    async fn lookup(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => {
                trace!(key_prefix = key_prefix(key), "cache hit");
                return Some(entry.token.clone());
            }
            Some(_) => true,
            None => false,
        };
        // the shard guard is released before we take the write path
        if expired {
            self.entries.remove(key);
            trace!(key_prefix = key_prefix(key), "expired entry evicted on lookup");
        }
        None
    }

    async fn store(&self, key: &str, token: &str, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        // entries are never mutated in place: replacement is delete-then-insert
        self.entries.remove(key);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                token: token.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn evict_expired(&self) {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| now < entry.expires_at);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = self.entries.len(), "cache sweep");
        }
    }
}

/// Spawn a periodic sweep over the cache; the host owns the returned handle
/// and aborts it at shutdown
pub fn spawn_sweep_task(
    cache: Arc<InMemoryCache>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick fires immediately; skip it
        ticker.tick().await;
        loop {
            ticker.tick().await;
            cache.evict_expired().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix_respects_char_boundaries() {
        assert_eq!(key_prefix("0123456789abcdef"), "01234567");
        assert_eq!(key_prefix("abc"), "abc");
        // byte 8 falls inside the third character
        assert_eq!(key_prefix("€€€€"), "€€€€");
    }

    #[tokio::test]
    async fn test_store_then_lookup_returns_token() {
        let cache = InMemoryCache::new();
        cache.store("k1", "xyz", Duration::from_secs(60)).await;
        assert_eq!(cache.lookup("k1").await.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent_and_removed() {
        let cache = InMemoryCache::new();
        cache.store("k1", "xyz", Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.lookup("k1").await, None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_store_is_noop() {
        let cache = InMemoryCache::new();
        cache.store("k1", "xyz", Duration::ZERO).await;
        assert_eq!(cache.lookup("k1").await, None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_store_replaces_existing_entry() {
        let cache = InMemoryCache::new();
        cache.store("k1", "old", Duration::from_secs(60)).await;
        cache.store("k1", "new", Duration::from_secs(60)).await;
        assert_eq!(cache.lookup("k1").await.as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_evict_expired_sweeps_only_past_deadline() {
        let cache = InMemoryCache::new();
        cache.store("gone", "a", Duration::from_millis(10)).await;
        cache.store("kept", "b", Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.evict_expired().await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("kept").await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_non_ascii_keys_are_handled() {
        let cache = InMemoryCache::new();
        // 3-byte characters put no char boundary at byte 8
        let key = "€€€€";
        cache.store(key, "tok", Duration::from_millis(10)).await;
        assert_eq!(cache.lookup(key).await.as_deref(), Some("tok"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.lookup(key).await, None);
    }

    #[tokio::test]
    async fn test_concurrent_store_and_lookup() {
        let cache = Arc::new(InMemoryCache::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                let key = format!("k{}", i % 4);
                cache.store(&key, "tok", Duration::from_secs(5)).await;
                cache.lookup(&key).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().as_deref(), Some("tok"));
        }
    }
}
