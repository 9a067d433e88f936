//! TokenBridge - request-time security token exchange for reverse proxies
//! and gateways
//!
//! For every inbound request the host hands this crate a caller-presented
//! source token and a scope id; the crate exchanges the token with the
//! configured Security Token Service backend (WS-Trust, ROPC, or OAuth2
//! token exchange) for a downstream-scoped target token, caching results so
//! the backend is not hit on every request. The host router, transport, and
//! directive parsing stay outside: this crate consumes structured scope
//! configuration and returns typed outcomes.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;

pub use backend::{IssuedToken, TokenBackend};
pub use cache::{cache_fingerprint, InMemoryCache, TokenCache};
pub use config::{
    merge, BackendType, CacheBackend, EndpointAuth, ExchangeConfig, ExchangeScopeConfig,
};
pub use error::{ExchangeError, Result};
pub use orchestrator::{ExchangeOutcome, Orchestrator, ScopeRegistry};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
