//! Exchange configuration types: the mergeable per-scope form and the
//! resolved immutable form consumed on the request path.

use std::time::Duration;

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::config::validator;
use crate::error::Result;

/// Default outbound HTTP timeout applied to STS calls, in milliseconds
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 20_000;

/// Default lifetime of a cached target token, in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default WS-Trust token type requested from the STS
pub const DEFAULT_WSTRUST_TOKEN_TYPE: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// Custom serde module for Secret<String>
mod secret_string {
    use secrecy::{ExposeSecret, Secret};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(secret: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(secret.expose_secret())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Secret<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Secret::new(s))
    }
}

/// Custom serde module for Option<Secret<String>>
mod option_secret_string {
    use secrecy::{ExposeSecret, Secret};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(secret: &Option<Secret<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match secret {
            Some(ref s) => serializer.serialize_some(s.expose_secret()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Secret<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_s = Option::<String>::deserialize(deserializer)?;
        Ok(opt_s.map(Secret::new))
    }
}

/// STS backend flavor selected for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// No exchange for this scope; the orchestrator declines
    #[default]
    Disabled,
    /// WS-Trust 1.3 RequestSecurityToken over SOAP 1.2
    WsTrust,
    /// OAuth2 Resource Owner Password Credentials grant
    Ropc,
    /// OAuth2 token exchange grant (RFC 8693)
    TokenExchange,
}

impl BackendType {
    /// Stable tag used in logs and cache fingerprints
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Disabled => "disabled",
            BackendType::WsTrust => "wstrust",
            BackendType::Ropc => "ropc",
            BackendType::TokenExchange => "token_exchange",
        }
    }
}

/// How to authenticate against the STS endpoint itself
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum EndpointAuth {
    /// Anonymous call
    #[default]
    None,
    /// HTTP Basic with client id/secret (client_secret_basic)
    Basic {
        client_id: String,
        /// Client secret (sensitive - protected by secrecy)
        #[serde(with = "secret_string")]
        client_secret: Secret<String>,
    },
    /// Bearer token obtained via a preliminary client-credentials grant
    /// against a fixed, non-cached token endpoint
    ClientCredentials {
        client_id: String,
        /// Client secret (sensitive - protected by secrecy)
        #[serde(with = "secret_string")]
        client_secret: Secret<String>,
        token_endpoint: String,
    },
    /// TLS client certificate presented during the outbound handshake
    ClientCert {
        cert_pem_path: String,
        key_pem_path: String,
    },
}

impl EndpointAuth {
    /// Stable tag used in logs and cache fingerprints
    pub fn scheme(&self) -> &'static str {
        match self {
            EndpointAuth::None => "none",
            EndpointAuth::Basic { .. } => "basic",
            EndpointAuth::ClientCredentials { .. } => "client_credentials",
            EndpointAuth::ClientCert { .. } => "client_cert",
        }
    }

    /// Identity material that affects the exchanged token, for fingerprinting
    pub(crate) fn fingerprint_fields(&self) -> Vec<String> {
        match self {
            EndpointAuth::None => vec![],
            EndpointAuth::Basic {
                client_id,
                client_secret,
            } => vec![client_id.clone(), client_secret.expose_secret().clone()],
            EndpointAuth::ClientCredentials {
                client_id,
                client_secret,
                token_endpoint,
            } => vec![
                client_id.clone(),
                client_secret.expose_secret().clone(),
                token_endpoint.clone(),
            ],
            EndpointAuth::ClientCert {
                cert_pem_path,
                key_pem_path,
            } => vec![cert_pem_path.clone(), key_pem_path.clone()],
        }
    }
}

/// Where exchanged tokens are cached
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheBackend {
    /// Never cache
    None,
    /// Process-local concurrent map
    #[default]
    InMemory,
    /// External store shared by multiple orchestrator instances
    Shared {
        /// Connection URL of the shared store (e.g. redis://host:6379)
        url: String,
        /// Prefix applied to every cache key in the shared store
        #[serde(default = "default_key_prefix")]
        key_prefix: String,
    },
}

fn default_key_prefix() -> String {
    "tokenbridge:".to_string()
}

/// Per-scope exchange configuration in its mergeable form
///
/// Every field is optional: `None` means "inherit from the parent scope".
/// Hosts typically deserialize one of these per routing scope and fold the
/// chain with [`crate::config::merge`] before calling [`resolve`](Self::resolve).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangeScopeConfig {
    /// Which STS backend to use
    pub backend: Option<BackendType>,
    /// Whether to verify the backend's TLS certificate
    pub tls_validation: Option<bool>,
    /// Connect and read timeout for the outbound STS call, in milliseconds
    pub http_timeout_ms: Option<u64>,

    /// WS-Trust STS endpoint URL
    pub wstrust_endpoint: Option<String>,
    /// Auth scheme for calling the WS-Trust endpoint
    pub wstrust_endpoint_auth: Option<EndpointAuth>,
    /// WS-Trust AppliesTo (relying party the issued token is scoped to)
    pub wstrust_applies_to: Option<String>,
    /// WS-Trust TokenType URI requested from the STS
    pub wstrust_token_type: Option<String>,
    /// ValueType attribute placed on the embedded source token
    pub wstrust_value_type: Option<String>,

    /// ROPC token endpoint URL
    pub ropc_endpoint: Option<String>,
    /// Auth scheme for calling the ROPC endpoint
    pub ropc_endpoint_auth: Option<EndpointAuth>,
    /// OAuth2 client id for the ROPC grant
    pub ropc_client_id: Option<String>,
    /// Resource owner username (from configuration, never from the request)
    pub ropc_username: Option<String>,
    /// Resource owner password (sensitive - protected by secrecy)
    #[serde(with = "option_secret_string")]
    pub ropc_password: Option<Secret<String>>,

    /// Token exchange endpoint URL
    pub token_exchange_endpoint: Option<String>,
    /// Auth scheme for calling the token exchange endpoint
    pub token_exchange_endpoint_auth: Option<EndpointAuth>,
    /// OAuth2 client id for the token exchange grant
    pub token_exchange_client_id: Option<String>,

    /// Lifetime of a cached target token in seconds; 0 disables caching
    pub cache_ttl_s: Option<u64>,
    /// Cache backend selection
    pub cache_backend: Option<CacheBackend>,
    /// Ordered (name, value) pairs appended to the outbound exchange request
    pub request_parameters: Option<Vec<(String, String)>>,
}

impl ExchangeScopeConfig {
    /// Create an empty scope configuration (everything inherits)
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a scope configuration from YAML
    ///
    /// A document that fails to parse is a configuration error, like any
    /// other problem caught at scope registration time.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| crate::error::ExchangeError::config(format!("invalid scope YAML: {}", e)))
    }

    /// Validate this scope and produce the immutable resolved configuration
    ///
    /// This is the registration-time boundary: every configuration problem
    /// is reported here, never on the request path.
    pub fn resolve(&self) -> Result<ExchangeConfig> {
        validator::validate_scope(self)?;

        let backend = self.backend.unwrap_or_default();

        let wstrust = match backend {
            BackendType::WsTrust => Some(WsTrustConfig {
                // validate_scope guarantees presence
                endpoint: self.wstrust_endpoint.clone().unwrap_or_default(),
                endpoint_auth: self.wstrust_endpoint_auth.clone().unwrap_or_default(),
                applies_to: self.wstrust_applies_to.clone().unwrap_or_default(),
                token_type: self
                    .wstrust_token_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_WSTRUST_TOKEN_TYPE.to_string()),
                value_type: self.wstrust_value_type.clone().unwrap_or_default(),
            }),
            _ => None,
        };

        let ropc = match backend {
            BackendType::Ropc => Some(RopcConfig {
                endpoint: self.ropc_endpoint.clone().unwrap_or_default(),
                endpoint_auth: self.ropc_endpoint_auth.clone().unwrap_or_default(),
                client_id: self.ropc_client_id.clone().unwrap_or_default(),
                username: self.ropc_username.clone().unwrap_or_default(),
                password: self
                    .ropc_password
                    .clone()
                    .unwrap_or_else(|| Secret::new(String::new())),
            }),
            _ => None,
        };

        let token_exchange = match backend {
            BackendType::TokenExchange => Some(TokenExchangeConfig {
                endpoint: self.token_exchange_endpoint.clone().unwrap_or_default(),
                endpoint_auth: self
                    .token_exchange_endpoint_auth
                    .clone()
                    .unwrap_or_default(),
                client_id: self.token_exchange_client_id.clone().unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(ExchangeConfig {
            backend,
            tls_validation: self.tls_validation.unwrap_or(true),
            http_timeout: Duration::from_millis(
                self.http_timeout_ms.unwrap_or(DEFAULT_HTTP_TIMEOUT_MS),
            ),
            wstrust,
            ropc,
            token_exchange,
            cache_ttl: Duration::from_secs(self.cache_ttl_s.unwrap_or(DEFAULT_CACHE_TTL_SECS)),
            cache_backend: self.cache_backend.clone().unwrap_or_default(),
            request_parameters: self.request_parameters.clone().unwrap_or_default(),
        })
    }
}

/// Resolved WS-Trust backend settings
#[derive(Debug, Clone)]
pub struct WsTrustConfig {
    pub endpoint: String,
    pub endpoint_auth: EndpointAuth,
    pub applies_to: String,
    pub token_type: String,
    /// Empty means: embed the source token without a ValueType attribute
    pub value_type: String,
}

/// Resolved ROPC backend settings
#[derive(Debug, Clone)]
pub struct RopcConfig {
    pub endpoint: String,
    pub endpoint_auth: EndpointAuth,
    pub client_id: String,
    pub username: String,
    pub password: Secret<String>,
}

/// Resolved token exchange backend settings
#[derive(Debug, Clone)]
pub struct TokenExchangeConfig {
    pub endpoint: String,
    pub endpoint_auth: EndpointAuth,
    pub client_id: String,
}

/// Fully resolved, immutable exchange configuration for one scope
///
/// Created once at scope registration and read-only thereafter; request
/// handling never mutates it.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub backend: BackendType,
    pub tls_validation: bool,
    pub http_timeout: Duration,
    pub wstrust: Option<WsTrustConfig>,
    pub ropc: Option<RopcConfig>,
    pub token_exchange: Option<TokenExchangeConfig>,
    pub cache_ttl: Duration,
    pub cache_backend: CacheBackend,
    pub request_parameters: Vec<(String, String)>,
}

impl ExchangeConfig {
    /// The endpoint auth configured for the selected backend
    pub fn endpoint_auth(&self) -> &EndpointAuth {
        static ANON: EndpointAuth = EndpointAuth::None;
        match self.backend {
            BackendType::WsTrust => self.wstrust.as_ref().map(|c| &c.endpoint_auth),
            BackendType::Ropc => self.ropc.as_ref().map(|c| &c.endpoint_auth),
            BackendType::TokenExchange => self.token_exchange.as_ref().map(|c| &c.endpoint_auth),
            BackendType::Disabled => None,
        }
        .unwrap_or(&ANON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_fills_defaults() {
        let scope = ExchangeScopeConfig {
            backend: Some(BackendType::Ropc),
            ropc_endpoint: Some("https://sts.example.com/token".to_string()),
            ropc_client_id: Some("client".to_string()),
            ropc_username: Some("svc".to_string()),
            ropc_password: Some(Secret::new("hunter2".to_string())),
            ..Default::default()
        };
        let resolved = scope.resolve().unwrap();
        assert!(resolved.tls_validation);
        assert_eq!(
            resolved.http_timeout,
            Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS)
        );
        assert_eq!(resolved.cache_ttl, Duration::from_secs(DEFAULT_CACHE_TTL_SECS));
        assert!(matches!(resolved.cache_backend, CacheBackend::InMemory));
        assert!(resolved.ropc.is_some());
        assert!(resolved.wstrust.is_none());
    }

    #[test]
    fn test_default_backend_is_disabled() {
        let resolved = ExchangeScopeConfig::new().resolve().unwrap();
        assert_eq!(resolved.backend, BackendType::Disabled);
    }

    #[test]
    fn test_wstrust_token_type_default() {
        let scope = ExchangeScopeConfig {
            backend: Some(BackendType::WsTrust),
            wstrust_endpoint: Some("https://sts.example.com/wstrust".to_string()),
            wstrust_applies_to: Some("urn:service-a".to_string()),
            ..Default::default()
        };
        let resolved = scope.resolve().unwrap();
        assert_eq!(
            resolved.wstrust.unwrap().token_type,
            DEFAULT_WSTRUST_TOKEN_TYPE
        );
    }

    #[test]
    fn test_scope_config_from_yaml() {
        let yaml = r#"
backend: token_exchange
token_exchange_endpoint: "https://sts.example.com/exchange"
token_exchange_client_id: "gateway"
token_exchange_endpoint_auth:
  scheme: basic
  client_id: "gateway"
  client_secret: "s3cr3t"
cache_ttl_s: 60
request_parameters:
  - ["audience", "urn:service-b"]
"#;
        let scope = ExchangeScopeConfig::from_yaml(yaml).unwrap();
        assert_eq!(scope.backend, Some(BackendType::TokenExchange));
        assert_eq!(scope.cache_ttl_s, Some(60));
        let resolved = scope.resolve().unwrap();
        let otx = resolved.token_exchange.unwrap();
        assert_eq!(otx.client_id, "gateway");
        assert_eq!(otx.endpoint_auth.scheme(), "basic");
        assert_eq!(
            resolved.request_parameters,
            vec![("audience".to_string(), "urn:service-b".to_string())]
        );
    }

    #[test]
    fn test_from_yaml_rejects_unknown_fields() {
        let yaml = "backend: ropc\nnot_a_field: true\n";
        let err = ExchangeScopeConfig::from_yaml(yaml).unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_from_yaml_parse_failure_is_config_error() {
        let err = ExchangeScopeConfig::from_yaml(": not yaml [").unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
