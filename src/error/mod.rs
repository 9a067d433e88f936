//! Error types for TokenBridge

pub mod error;

pub use error::{ExchangeError, Result};
