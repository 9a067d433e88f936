//! Configuration model for the token exchange core
//!
//! Scope configuration is hierarchical: a routing scope's unset fields
//! inherit the nearest ancestor's value field-by-field. Merging happens
//! root-to-leaf once at scope registration; request handling only ever
//! sees the immutable, fully resolved [`ExchangeConfig`].

pub mod config;
pub mod merge;
pub mod validator;

pub use config::{
    BackendType, CacheBackend, EndpointAuth, ExchangeConfig, ExchangeScopeConfig, RopcConfig,
    TokenExchangeConfig, WsTrustConfig, DEFAULT_CACHE_TTL_SECS, DEFAULT_HTTP_TIMEOUT_MS,
};
pub use merge::merge;
