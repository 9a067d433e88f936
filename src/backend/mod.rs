//! STS backend protocol adapters
//!
//! One adapter per backend flavor, behind a common trait: each turns a
//! source token plus the resolved configuration into a target token via a
//! single outbound HTTP call (plus, at most, one preliminary
//! client-credentials grant when the endpoint itself requires it).
//! Adapters never retry; retry policy, if any, belongs to the caller.

pub mod http;
pub mod ropc;
pub mod token_exchange;
pub mod wstrust;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{BackendType, ExchangeConfig};
use crate::error::{ExchangeError, Result};

pub use ropc::RopcBackend;
pub use token_exchange::TokenExchangeBackend;
pub use wstrust::WsTrustBackend;

/// A token issued by an STS backend
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The opaque target token
    pub token: String,
    /// Lifetime the backend reported for the token, if any; used to cap
    /// the cache TTL so a cached token is never served past its own expiry
    pub expires_in: Option<Duration>,
}

/// Common contract of every STS protocol adapter
#[async_trait]
pub trait TokenBackend: Send + Sync {
    /// Exchange `source_token` for a target token per `config`
    ///
    /// Transport failures surface as `BackendUnavailable`, non-2xx
    /// responses and unparsable bodies as `BackendProtocol`; failures are
    /// passed through to the orchestrator unchanged.
    async fn exchange(&self, source_token: &str, config: &ExchangeConfig) -> Result<IssuedToken>;
}

/// Select the adapter for a resolved configuration
pub fn backend_for(config: &ExchangeConfig) -> Result<Box<dyn TokenBackend>> {
    match config.backend {
        BackendType::WsTrust => Ok(Box::new(WsTrustBackend)),
        BackendType::Ropc => Ok(Box::new(RopcBackend)),
        BackendType::TokenExchange => Ok(Box::new(TokenExchangeBackend)),
        BackendType::Disabled => Err(ExchangeError::config(
            "no backend adapter for a disabled scope",
        )),
    }
}
