//! Registration-time validation of merged scope configurations
//!
//! Everything here runs once, from [`ExchangeScopeConfig::resolve`]; a scope
//! that validates never produces a configuration error on the request path.

use secrecy::ExposeSecret;
use url::Url;

use crate::config::{BackendType, CacheBackend, EndpointAuth, ExchangeScopeConfig};
use crate::error::{ExchangeError, Result};

/// Validate a merged scope configuration
pub(crate) fn validate_scope(scope: &ExchangeScopeConfig) -> Result<()> {
    let backend = scope.backend.unwrap_or_default();

    match backend {
        BackendType::Disabled => {}
        BackendType::WsTrust => {
            require_url("wstrust_endpoint", scope.wstrust_endpoint.as_deref())?;
            require_set("wstrust_applies_to", scope.wstrust_applies_to.as_deref())?;
            reject_foreign_fields(scope, backend)?;
            if let Some(ref auth) = scope.wstrust_endpoint_auth {
                validate_endpoint_auth("wstrust", auth)?;
            }
        }
        BackendType::Ropc => {
            require_url("ropc_endpoint", scope.ropc_endpoint.as_deref())?;
            require_set("ropc_client_id", scope.ropc_client_id.as_deref())?;
            require_set("ropc_username", scope.ropc_username.as_deref())?;
            if scope
                .ropc_password
                .as_ref()
                .map(|p| p.expose_secret().is_empty())
                .unwrap_or(true)
            {
                return Err(ExchangeError::config(
                    "ropc backend requires ropc_password",
                ));
            }
            reject_foreign_fields(scope, backend)?;
            if let Some(ref auth) = scope.ropc_endpoint_auth {
                validate_endpoint_auth("ropc", auth)?;
            }
        }
        BackendType::TokenExchange => {
            require_url(
                "token_exchange_endpoint",
                scope.token_exchange_endpoint.as_deref(),
            )?;
            require_set(
                "token_exchange_client_id",
                scope.token_exchange_client_id.as_deref(),
            )?;
            reject_foreign_fields(scope, backend)?;
            if let Some(ref auth) = scope.token_exchange_endpoint_auth {
                validate_endpoint_auth("token_exchange", auth)?;
            }
        }
    }

    if let Some(CacheBackend::Shared { ref url, .. }) = scope.cache_backend {
        Url::parse(url).map_err(|_| {
            ExchangeError::config(format!("Invalid shared cache store URL: {}", url))
        })?;
    }

    Ok(())
}

/// Reject fields belonging to a backend other than the selected one
fn reject_foreign_fields(scope: &ExchangeScopeConfig, backend: BackendType) -> Result<()> {
    let wstrust_set = scope.wstrust_endpoint.is_some()
        || scope.wstrust_endpoint_auth.is_some()
        || scope.wstrust_applies_to.is_some()
        || scope.wstrust_token_type.is_some()
        || scope.wstrust_value_type.is_some();
    let ropc_set = scope.ropc_endpoint.is_some()
        || scope.ropc_endpoint_auth.is_some()
        || scope.ropc_client_id.is_some()
        || scope.ropc_username.is_some()
        || scope.ropc_password.is_some();
    let otx_set = scope.token_exchange_endpoint.is_some()
        || scope.token_exchange_endpoint_auth.is_some()
        || scope.token_exchange_client_id.is_some();

    let conflict = match backend {
        BackendType::WsTrust if ropc_set || otx_set => Some("ropc/token_exchange"),
        BackendType::Ropc if wstrust_set || otx_set => Some("wstrust/token_exchange"),
        BackendType::TokenExchange if wstrust_set || ropc_set => Some("wstrust/ropc"),
        _ => None,
    };

    match conflict {
        Some(foreign) => Err(ExchangeError::config(format!(
            "backend is {} but {} fields are set",
            backend.as_str(),
            foreign
        ))),
        None => Ok(()),
    }
}

fn require_set(name: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(ExchangeError::config(format!("{} must be set", name))),
    }
}

fn require_url(name: &str, value: Option<&str>) -> Result<()> {
    require_set(name, value)?;
    let url = value.unwrap_or_default();
    Url::parse(url)
        .map_err(|_| ExchangeError::config(format!("Invalid {} URL: {}", name, url)))?;
    Ok(())
}

fn validate_endpoint_auth(backend: &str, auth: &EndpointAuth) -> Result<()> {
    match auth {
        EndpointAuth::None => Ok(()),
        EndpointAuth::Basic {
            client_id,
            client_secret,
        } => {
            if client_id.is_empty() || client_secret.expose_secret().is_empty() {
                return Err(ExchangeError::config(format!(
                    "{} basic endpoint auth requires client_id and client_secret",
                    backend
                )));
            }
            Ok(())
        }
        EndpointAuth::ClientCredentials {
            client_id,
            client_secret,
            token_endpoint,
        } => {
            if client_id.is_empty() || client_secret.expose_secret().is_empty() {
                return Err(ExchangeError::config(format!(
                    "{} client_credentials endpoint auth requires client_id and client_secret",
                    backend
                )));
            }
            Url::parse(token_endpoint).map_err(|_| {
                ExchangeError::config(format!(
                    "Invalid {} client_credentials token_endpoint URL: {}",
                    backend, token_endpoint
                ))
            })?;
            Ok(())
        }
        EndpointAuth::ClientCert {
            cert_pem_path,
            key_pem_path,
        } => {
            if cert_pem_path.is_empty() || key_pem_path.is_empty() {
                return Err(ExchangeError::config(format!(
                    "{} client_cert endpoint auth requires cert_pem_path and key_pem_path",
                    backend
                )));
            }
            Ok(())
        }
    }
}
