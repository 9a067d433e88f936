//! Error types and handling for the token exchange core

use thiserror::Error;

/// Result type alias for token exchange operations
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Main error type for the token exchange core
///
/// Every failure surfaced to a host carries a stable kind (see
/// [`ExchangeError::category`]) so the host can make deterministic
/// block-vs-pass-through decisions.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Configuration errors, detected at scope registration time
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Caller usage errors (e.g. empty source token)
    #[error("Usage error: {message}")]
    Usage { message: String },

    /// The STS backend could not be reached (connect refused, timeout, TLS failure)
    #[error("Backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// The STS backend answered, but with a non-2xx status or an unparsable body
    #[error("Backend protocol error (status {status}): {snippet}")]
    BackendProtocol { status: u16, snippet: String },
}

impl ExchangeError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a usage error
    pub fn usage<S: Into<String>>(message: S) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Create a backend-unavailable error
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Create a backend protocol error carrying the HTTP status and a diagnostic snippet
    pub fn protocol<S: Into<String>>(status: u16, snippet: S) -> Self {
        Self::BackendProtocol {
            status,
            snippet: snippet.into(),
        }
    }

    /// Get the error category for logging/metrics and host policy decisions
    pub fn category(&self) -> &'static str {
        match self {
            ExchangeError::Config { .. } => "config",
            ExchangeError::Usage { .. } => "usage",
            ExchangeError::BackendUnavailable { .. } => "backend_unavailable",
            ExchangeError::BackendProtocol { .. } => "backend_protocol",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories_are_stable() {
        assert_eq!(ExchangeError::config("x").category(), "config");
        assert_eq!(ExchangeError::usage("x").category(), "usage");
        assert_eq!(
            ExchangeError::unavailable("x").category(),
            "backend_unavailable"
        );
        assert_eq!(
            ExchangeError::protocol(401, "x").category(),
            "backend_protocol"
        );
    }

    #[test]
    fn test_protocol_error_carries_status() {
        match ExchangeError::protocol(502, "bad gateway") {
            ExchangeError::BackendProtocol { status, snippet } => {
                assert_eq!(status, 502);
                assert_eq!(snippet, "bad gateway");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
