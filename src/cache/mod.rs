//! Exchange response cache
//!
//! Maps a fingerprint of (source token, effective configuration) to a
//! previously obtained target token. The cache is best-effort: a store that
//! fails degrades to a miss, never to a request failure. Entries are never
//! mutated in place; replacement is delete-then-insert.

pub mod fingerprint;
pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::CacheBackend;
use crate::error::Result;

pub use fingerprint::cache_fingerprint;
pub use memory::{spawn_sweep_task, InMemoryCache};

/// Key/value store for exchanged tokens
///
/// The fingerprinting scheme is stable and implementation-independent, so
/// in-process and shared backends are interchangeable behind this trait.
#[async_trait]
pub trait TokenCache: Send + Sync + std::fmt::Debug {
    /// Look up a non-expired target token; expired entries count as absent
    async fn lookup(&self, key: &str) -> Option<String>;

    /// Store a target token under `key` for `ttl`; a zero `ttl` is a no-op
    async fn store(&self, key: &str, token: &str, ttl: Duration);

    /// Remove entries past their deadline (backends with native expiry no-op)
    async fn evict_expired(&self);
}

/// A cache that never stores and never hits, for `cache_backend: none`
#[derive(Debug, Default)]
pub struct NoCache;

#[async_trait]
impl TokenCache for NoCache {
    async fn lookup(&self, _key: &str) -> Option<String> {
        None
    }

    async fn store(&self, _key: &str, _token: &str, _ttl: Duration) {}

    async fn evict_expired(&self) {}
}

/// Build the cache implementation selected by a resolved configuration
pub async fn build_cache(backend: &CacheBackend) -> Result<Arc<dyn TokenCache>> {
    match backend {
        CacheBackend::None => Ok(Arc::new(NoCache)),
        CacheBackend::InMemory => Ok(Arc::new(InMemoryCache::new())),
        #[cfg(feature = "redis-cache")]
        CacheBackend::Shared { url, key_prefix } => Ok(Arc::new(
            redis::RedisCache::connect(url, key_prefix.clone()).await?,
        )),
        #[cfg(not(feature = "redis-cache"))]
        CacheBackend::Shared { .. } => Err(crate::error::ExchangeError::config(
            "shared cache backend requires the 'redis-cache' feature",
        )),
    }
}
