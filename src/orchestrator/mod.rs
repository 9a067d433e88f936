//! Per-request exchange orchestration
//!
//! The orchestrator is the host's single entry point on the request path,
//! invoked after authentication and before upstream dispatch: resolve the
//! scope's configuration, consult the cache, invoke the right backend
//! adapter on a miss, populate the cache, and hand the outcome back. It is
//! invoked concurrently across in-flight requests; the configuration tree
//! is read-only and the cache handles its own synchronization, so the
//! orchestrator itself holds no locks.
//!
//! The outcome is owned by the call that produced it. Nothing is written
//! back to shared per-scope state, so two simultaneous requests in the same
//! scope can never observe each other's token.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::backend_for;
use crate::cache::{build_cache, cache_fingerprint, TokenCache};
use crate::config::{merge, BackendType, CacheBackend, ExchangeConfig, ExchangeScopeConfig};
use crate::error::{ExchangeError, Result};

/// Successful terminal outcomes of an exchange attempt
///
/// `Declined` (backend disabled for the scope) is a valid outcome, not an
/// error: the host proceeds without a target token. Failures are the
/// [`ExchangeError`] cases of the surrounding `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// A target token was obtained (freshly exchanged or served from cache)
    Exchanged(String),
    /// Exchange is disabled for this scope
    Declined,
}

/// Per-request exchange driver sharing one cache across invocations
pub struct Orchestrator {
    cache: Arc<dyn TokenCache>,
}

impl Orchestrator {
    /// Create an orchestrator over an existing cache
    pub fn new(cache: Arc<dyn TokenCache>) -> Self {
        Self { cache }
    }

    /// Handle one request: exchange `source_token` per `config`
    ///
    /// Performs at most one outbound network call. Failures come back
    /// unchanged from the adapter; nothing is retried and no fallback
    /// backend is attempted.
    pub async fn handle_request(
        &self,
        source_token: &str,
        config: &ExchangeConfig,
    ) -> Result<ExchangeOutcome> {
        if config.backend == BackendType::Disabled {
            debug!("exchange disabled for scope");
            return Ok(ExchangeOutcome::Declined);
        }

        if source_token.is_empty() {
            return Err(ExchangeError::usage("empty source token"));
        }

        debug!(
            backend = config.backend.as_str(),
            source_token_len = source_token.len(),
            "enter token exchange"
        );

        let cache_enabled = !config.cache_ttl.is_zero();
        let key = cache_fingerprint(source_token, config);

        if cache_enabled {
            if let Some(token) = self.cache.lookup(&key).await {
                debug!(backend = config.backend.as_str(), "serving cached target token");
                return Ok(ExchangeOutcome::Exchanged(token));
            }
        }

        let backend = backend_for(config)?;
        let issued = backend
            .exchange(source_token, config)
            .await
            .map_err(|e| {
                warn!(
                    backend = config.backend.as_str(),
                    category = e.category(),
                    error = %e,
                    "token exchange failed"
                );
                e
            })?;

        if cache_enabled {
            // never serve a cached token past its own reported lifetime
            let ttl = match issued.expires_in {
                Some(expires_in) => config.cache_ttl.min(expires_in),
                None => config.cache_ttl,
            };
            self.cache.store(&key, &issued.token, ttl).await;
        }

        debug!(
            backend = config.backend.as_str(),
            target_token_len = issued.token.len(),
            "leave token exchange"
        );
        Ok(ExchangeOutcome::Exchanged(issued.token))
    }
}

/// Startup-built mapping of scope ids to resolved configurations and their
/// orchestrators; read-only once built
pub struct ScopeRegistry {
    scopes: HashMap<String, ScopeEntry>,
}

struct ScopeEntry {
    config: Arc<ExchangeConfig>,
    orchestrator: Orchestrator,
}

impl ScopeRegistry {
    /// Start building a registry
    pub fn builder() -> ScopeRegistryBuilder {
        ScopeRegistryBuilder {
            scopes: HashMap::new(),
        }
    }

    /// The resolved configuration registered for a scope
    pub fn config(&self, scope_id: &str) -> Option<&Arc<ExchangeConfig>> {
        self.scopes.get(scope_id).map(|entry| &entry.config)
    }

    /// Handle one request against the scope the router matched
    ///
    /// This is the extension-point contract for a host: call it after
    /// authentication, before upstream dispatch, and expose the returned
    /// target token to downstream processing.
    pub async fn handle(&self, scope_id: &str, source_token: &str) -> Result<ExchangeOutcome> {
        let entry = self.scopes.get(scope_id).ok_or_else(|| {
            ExchangeError::config(format!("unknown exchange scope: {}", scope_id))
        })?;
        entry
            .orchestrator
            .handle_request(source_token, &entry.config)
            .await
    }
}

/// Registers scopes from root-to-leaf configuration chains and wires each
/// resolved scope to its cache
#[derive(Debug)]
pub struct ScopeRegistryBuilder {
    scopes: HashMap<String, Arc<ExchangeConfig>>,
}

impl ScopeRegistryBuilder {
    /// Register a scope from its root-to-leaf chain of scope configs
    ///
    /// The chain is merged field-by-field and resolved here, at
    /// registration time; configuration errors surface now, never on the
    /// request path.
    pub fn register(mut self, scope_id: &str, chain: &[&ExchangeScopeConfig]) -> Result<Self> {
        let merged = merge::merge_chain(chain);
        let resolved = merged.resolve()?;
        self.scopes
            .insert(scope_id.to_string(), Arc::new(resolved));
        Ok(self)
    }

    /// Build the registry, creating cache backends
    ///
    /// Scopes selecting the in-memory backend share one process-wide cache;
    /// fingerprints keep their entries disjoint. Shared backends are
    /// memoized per store URL.
    pub async fn build(self) -> Result<ScopeRegistry> {
        let in_memory: Arc<dyn TokenCache> = build_cache(&CacheBackend::InMemory).await?;
        let none: Arc<dyn TokenCache> = build_cache(&CacheBackend::None).await?;
        let mut shared: HashMap<String, Arc<dyn TokenCache>> = HashMap::new();

        let mut scopes = HashMap::new();
        for (scope_id, config) in self.scopes {
            let cache = match &config.cache_backend {
                CacheBackend::None => Arc::clone(&none),
                CacheBackend::InMemory => Arc::clone(&in_memory),
                CacheBackend::Shared { url, .. } => match shared.get(url) {
                    Some(cache) => Arc::clone(cache),
                    None => {
                        let cache = build_cache(&config.cache_backend).await?;
                        shared.insert(url.clone(), Arc::clone(&cache));
                        cache
                    }
                },
            };
            scopes.insert(
                scope_id,
                ScopeEntry {
                    orchestrator: Orchestrator::new(cache),
                    config,
                },
            );
        }

        Ok(ScopeRegistry { scopes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::config::BackendType;

    fn disabled_config() -> ExchangeConfig {
        ExchangeScopeConfig::new().resolve().unwrap()
    }

    fn otx_scope() -> ExchangeScopeConfig {
        ExchangeScopeConfig {
            backend: Some(BackendType::TokenExchange),
            token_exchange_endpoint: Some("https://sts.example.com/x".to_string()),
            token_exchange_client_id: Some("c".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_backend_declines_without_network() {
        let orchestrator = Orchestrator::new(Arc::new(InMemoryCache::new()));
        let outcome = orchestrator
            .handle_request("abc", &disabled_config())
            .await
            .unwrap();
        assert_eq!(outcome, ExchangeOutcome::Declined);
    }

    #[tokio::test]
    async fn test_empty_source_token_is_usage_error() {
        let orchestrator = Orchestrator::new(Arc::new(InMemoryCache::new()));
        let config = otx_scope().resolve().unwrap();
        let err = orchestrator.handle_request("", &config).await.unwrap_err();
        assert_eq!(err.category(), "usage");
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits_backend() {
        let cache = Arc::new(InMemoryCache::new());
        let config = otx_scope().resolve().unwrap();
        // pre-populate under the exact fingerprint; the endpoint is
        // unreachable, so any backend invocation would fail
        let key = cache_fingerprint("abc", &config);
        crate::cache::TokenCache::store(
            cache.as_ref(),
            &key,
            "cached-token",
            std::time::Duration::from_secs(60),
        )
        .await;

        let orchestrator = Orchestrator::new(cache);
        let outcome = orchestrator.handle_request("abc", &config).await.unwrap();
        assert_eq!(
            outcome,
            ExchangeOutcome::Exchanged("cached-token".to_string())
        );
    }

    #[tokio::test]
    async fn test_registry_unknown_scope_is_config_error() {
        let registry = ScopeRegistry::builder().build().await.unwrap();
        let err = registry.handle("nope", "abc").await.unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[tokio::test]
    async fn test_registry_merges_chain_at_registration() {
        let parent = ExchangeScopeConfig {
            cache_ttl_s: Some(60),
            ..otx_scope()
        };
        let child = ExchangeScopeConfig {
            token_exchange_client_id: Some("leaf".to_string()),
            ..Default::default()
        };
        let registry = ScopeRegistry::builder()
            .register("api", &[&parent, &child])
            .unwrap()
            .build()
            .await
            .unwrap();

        let config = registry.config("api").unwrap();
        assert_eq!(
            config.token_exchange.as_ref().unwrap().client_id,
            "leaf"
        );
        assert_eq!(config.cache_ttl, std::time::Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_registry_rejects_invalid_chain_at_registration() {
        let broken = ExchangeScopeConfig {
            backend: Some(BackendType::WsTrust),
            ..Default::default()
        };
        let err = ScopeRegistry::builder()
            .register("api", &[&broken])
            .unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
