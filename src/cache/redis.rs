//! Redis-backed shared cache (feature `redis-cache`)
//!
//! Lets multiple orchestrator instances share exchanged tokens: the
//! fingerprint scheme is process-independent, so any instance that computes
//! the same key can serve another's stored token. Expiry is delegated to
//! Redis via `SET ... EX`. The cache stays best-effort: store/lookup errors
//! are logged and degrade to a miss, they never fail the exchange.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::cache::TokenCache;
use crate::error::{ExchangeError, Result};

/// Shared token cache backed by a Redis store
#[derive(Debug, Clone)]
pub struct RedisCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisCache {
    /// Connect to the shared store and verify it is responsive
    pub async fn connect(url: &str, key_prefix: String) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            ExchangeError::config(format!("Failed to create shared cache client: {}", e))
        })?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                ExchangeError::config(format!("Failed to connect to shared cache: {}", e))
            })?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ExchangeError::config(format!("Shared cache ping failed: {}", e)))?;

        debug!(url, "shared cache connection established");

        Ok(Self { client, key_prefix })
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl TokenCache for RedisCache {
    async fn lookup(&self, key: &str) -> Option<String> {
        let storage_key = self.storage_key(key);
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "shared cache unreachable, treating as miss");
                return None;
            }
        };
        match conn.get::<_, Option<String>>(&storage_key).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "shared cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn store(&self, key: &str, token: &str, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let storage_key = self.storage_key(key);
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "shared cache unreachable, skipping store");
                return;
            }
        };
        if let Err(e) = conn
            .set_ex::<_, _, ()>(&storage_key, token, ttl.as_secs())
            .await
        {
            warn!(error = %e, "shared cache store failed");
        }
    }

    async fn evict_expired(&self) {
        // Redis expires keys on its own via the EX option set at store time
    }
}
