//! Cache key fingerprinting
//!
//! The key is a SHA-256 digest over a versioned, length-delimited
//! serialization of the source token and every configuration field that can
//! affect the backend's answer. Cache TTL and cache backend selection are
//! deliberately excluded: they change where and how long a token is stored,
//! not which token comes back. The encoding is byte-stable across processes
//! so in-memory and shared stores see identical keys.

use sha2::{Digest, Sha256};

use crate::config::{BackendType, ExchangeConfig};

/// Bumped whenever the field encoding below changes shape
const FINGERPRINT_VERSION: &str = "tokenbridge/1";

/// Compute the cache key for one (source token, resolved config) pair
pub fn cache_fingerprint(source_token: &str, config: &ExchangeConfig) -> String {
    let mut hasher = Sha256::new();

    segment(&mut hasher, FINGERPRINT_VERSION);
    segment(&mut hasher, source_token);
    segment(&mut hasher, config.backend.as_str());

    match config.backend {
        BackendType::Disabled => {}
        BackendType::WsTrust => {
            if let Some(ref c) = config.wstrust {
                segment(&mut hasher, &c.endpoint);
                segment(&mut hasher, &c.applies_to);
                segment(&mut hasher, &c.token_type);
                segment(&mut hasher, &c.value_type);
                auth_segments(&mut hasher, c.endpoint_auth.scheme(), c.endpoint_auth.fingerprint_fields());
            }
        }
        BackendType::Ropc => {
            if let Some(ref c) = config.ropc {
                use secrecy::ExposeSecret;
                segment(&mut hasher, &c.endpoint);
                segment(&mut hasher, &c.client_id);
                segment(&mut hasher, &c.username);
                segment(&mut hasher, c.password.expose_secret());
                auth_segments(&mut hasher, c.endpoint_auth.scheme(), c.endpoint_auth.fingerprint_fields());
            }
        }
        BackendType::TokenExchange => {
            if let Some(ref c) = config.token_exchange {
                segment(&mut hasher, &c.endpoint);
                segment(&mut hasher, &c.client_id);
                auth_segments(&mut hasher, c.endpoint_auth.scheme(), c.endpoint_auth.fingerprint_fields());
            }
        }
    }

    for (name, value) in &config.request_parameters {
        segment(&mut hasher, name);
        segment(&mut hasher, value);
    }

    hex::encode(hasher.finalize())
}

/// Length-prefixed segment, so ("ab","c") and ("a","bc") never collide
fn segment(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn auth_segments(hasher: &mut Sha256, scheme: &str, fields: Vec<String>) {
    segment(hasher, scheme);
    for field in &fields {
        segment(hasher, field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendType, ExchangeScopeConfig};

    fn otx_config(endpoint: &str, client_id: &str) -> ExchangeConfig {
        ExchangeScopeConfig {
            backend: Some(BackendType::TokenExchange),
            token_exchange_endpoint: Some(endpoint.to_string()),
            token_exchange_client_id: Some(client_id.to_string()),
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    #[test]
    fn test_same_inputs_same_fingerprint() {
        let config = otx_config("https://sts.example.com/x", "c1");
        assert_eq!(
            cache_fingerprint("abc", &config),
            cache_fingerprint("abc", &config)
        );
    }

    #[test]
    fn test_source_token_changes_fingerprint() {
        let config = otx_config("https://sts.example.com/x", "c1");
        assert_ne!(
            cache_fingerprint("abc", &config),
            cache_fingerprint("abd", &config)
        );
    }

    #[test]
    fn test_endpoint_fields_change_fingerprint() {
        let a = otx_config("https://sts.example.com/x", "c1");
        let b = otx_config("https://sts.example.com/y", "c1");
        let c = otx_config("https://sts.example.com/x", "c2");
        assert_ne!(cache_fingerprint("abc", &a), cache_fingerprint("abc", &b));
        assert_ne!(cache_fingerprint("abc", &a), cache_fingerprint("abc", &c));
    }

    #[test]
    fn test_cache_fields_do_not_change_fingerprint() {
        let mut scope = ExchangeScopeConfig {
            backend: Some(BackendType::TokenExchange),
            token_exchange_endpoint: Some("https://sts.example.com/x".to_string()),
            token_exchange_client_id: Some("c1".to_string()),
            cache_ttl_s: Some(60),
            ..Default::default()
        };
        let a = scope.resolve().unwrap();
        scope.cache_ttl_s = Some(0);
        scope.cache_backend = Some(crate::config::CacheBackend::None);
        let b = scope.resolve().unwrap();
        assert_eq!(cache_fingerprint("abc", &a), cache_fingerprint("abc", &b));
    }

    #[test]
    fn test_request_parameters_order_matters() {
        let mut scope = ExchangeScopeConfig {
            backend: Some(BackendType::TokenExchange),
            token_exchange_endpoint: Some("https://sts.example.com/x".to_string()),
            token_exchange_client_id: Some("c1".to_string()),
            request_parameters: Some(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ]),
            ..Default::default()
        };
        let ab = scope.resolve().unwrap();
        scope.request_parameters = Some(vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        let ba = scope.resolve().unwrap();
        assert_ne!(cache_fingerprint("abc", &ab), cache_fingerprint("abc", &ba));
    }

    #[test]
    fn test_backend_type_separates_key_spaces() {
        let otx = otx_config("https://sts.example.com/x", "c1");
        let ropc = ExchangeScopeConfig {
            backend: Some(BackendType::Ropc),
            ropc_endpoint: Some("https://sts.example.com/x".to_string()),
            ropc_client_id: Some("c1".to_string()),
            ropc_username: Some("u".to_string()),
            ropc_password: Some(secrecy::Secret::new("p".to_string())),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_ne!(
            cache_fingerprint("abc", &otx),
            cache_fingerprint("abc", &ropc)
        );
    }
}
