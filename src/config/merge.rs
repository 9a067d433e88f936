//! Field-wise hierarchical merge of scope configurations
//!
//! Mirrors the create/merge lifecycle a host's configuration loader drives:
//! scopes are created empty, merged root-to-leaf at registration time, and
//! resolved once. For every field, a value the child set wins; otherwise the
//! parent's value is inherited. There is no cross-field coupling, which
//! makes the merge associative.

use crate::config::ExchangeScopeConfig;

/// Merge a child scope over its parent, field by field
pub fn merge(parent: &ExchangeScopeConfig, child: &ExchangeScopeConfig) -> ExchangeScopeConfig {
    ExchangeScopeConfig {
        backend: child.backend.or(parent.backend),
        tls_validation: child.tls_validation.or(parent.tls_validation),
        http_timeout_ms: child.http_timeout_ms.or(parent.http_timeout_ms),

        wstrust_endpoint: child
            .wstrust_endpoint
            .clone()
            .or_else(|| parent.wstrust_endpoint.clone()),
        wstrust_endpoint_auth: child
            .wstrust_endpoint_auth
            .clone()
            .or_else(|| parent.wstrust_endpoint_auth.clone()),
        wstrust_applies_to: child
            .wstrust_applies_to
            .clone()
            .or_else(|| parent.wstrust_applies_to.clone()),
        wstrust_token_type: child
            .wstrust_token_type
            .clone()
            .or_else(|| parent.wstrust_token_type.clone()),
        wstrust_value_type: child
            .wstrust_value_type
            .clone()
            .or_else(|| parent.wstrust_value_type.clone()),

        ropc_endpoint: child
            .ropc_endpoint
            .clone()
            .or_else(|| parent.ropc_endpoint.clone()),
        ropc_endpoint_auth: child
            .ropc_endpoint_auth
            .clone()
            .or_else(|| parent.ropc_endpoint_auth.clone()),
        ropc_client_id: child
            .ropc_client_id
            .clone()
            .or_else(|| parent.ropc_client_id.clone()),
        ropc_username: child
            .ropc_username
            .clone()
            .or_else(|| parent.ropc_username.clone()),
        ropc_password: child
            .ropc_password
            .clone()
            .or_else(|| parent.ropc_password.clone()),

        token_exchange_endpoint: child
            .token_exchange_endpoint
            .clone()
            .or_else(|| parent.token_exchange_endpoint.clone()),
        token_exchange_endpoint_auth: child
            .token_exchange_endpoint_auth
            .clone()
            .or_else(|| parent.token_exchange_endpoint_auth.clone()),
        token_exchange_client_id: child
            .token_exchange_client_id
            .clone()
            .or_else(|| parent.token_exchange_client_id.clone()),

        cache_ttl_s: child.cache_ttl_s.or(parent.cache_ttl_s),
        cache_backend: child
            .cache_backend
            .clone()
            .or_else(|| parent.cache_backend.clone()),
        request_parameters: child
            .request_parameters
            .clone()
            .or_else(|| parent.request_parameters.clone()),
    }
}

/// Fold a root-to-leaf chain of scopes into one merged scope
pub fn merge_chain(chain: &[&ExchangeScopeConfig]) -> ExchangeScopeConfig {
    chain.iter().fold(ExchangeScopeConfig::new(), |acc, scope| {
        merge(&acc, scope)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendType;
    use secrecy::{ExposeSecret, Secret};

    fn parent() -> ExchangeScopeConfig {
        ExchangeScopeConfig {
            backend: Some(BackendType::Ropc),
            tls_validation: Some(false),
            http_timeout_ms: Some(5_000),
            ropc_endpoint: Some("https://parent.example.com/token".to_string()),
            ropc_client_id: Some("parent-client".to_string()),
            ropc_username: Some("parent-user".to_string()),
            ropc_password: Some(Secret::new("parent-pass".to_string())),
            cache_ttl_s: Some(120),
            ..Default::default()
        }
    }

    #[test]
    fn test_child_set_field_wins() {
        let child = ExchangeScopeConfig {
            ropc_client_id: Some("child-client".to_string()),
            ..Default::default()
        };
        let merged = merge(&parent(), &child);
        assert_eq!(merged.ropc_client_id.as_deref(), Some("child-client"));
    }

    #[test]
    fn test_unset_fields_inherit_independently() {
        let child = ExchangeScopeConfig {
            http_timeout_ms: Some(50),
            ..Default::default()
        };
        let merged = merge(&parent(), &child);
        // only the field the child set changes
        assert_eq!(merged.http_timeout_ms, Some(50));
        assert_eq!(merged.backend, Some(BackendType::Ropc));
        assert_eq!(merged.tls_validation, Some(false));
        assert_eq!(
            merged.ropc_endpoint.as_deref(),
            Some("https://parent.example.com/token")
        );
        assert_eq!(merged.cache_ttl_s, Some(120));
        assert_eq!(
            merged
                .ropc_password
                .as_ref()
                .map(|p| p.expose_secret().clone()),
            Some("parent-pass".to_string())
        );
    }

    #[test]
    fn test_merge_with_empty_child_is_identity() {
        let merged = merge(&parent(), &ExchangeScopeConfig::new());
        assert_eq!(merged.backend, parent().backend);
        assert_eq!(merged.ropc_username, parent().ropc_username);
        assert_eq!(merged.http_timeout_ms, parent().http_timeout_ms);
    }

    #[test]
    fn test_merge_is_associative() {
        let a = parent();
        let b = ExchangeScopeConfig {
            cache_ttl_s: Some(30),
            ropc_username: Some("b-user".to_string()),
            ..Default::default()
        };
        let c = ExchangeScopeConfig {
            cache_ttl_s: Some(10),
            tls_validation: Some(true),
            ..Default::default()
        };

        let left = merge(&merge(&a, &b), &c);
        let right = merge(&a, &merge(&b, &c));

        assert_eq!(left.cache_ttl_s, right.cache_ttl_s);
        assert_eq!(left.cache_ttl_s, Some(10));
        assert_eq!(left.ropc_username, right.ropc_username);
        assert_eq!(left.ropc_username.as_deref(), Some("b-user"));
        assert_eq!(left.tls_validation, right.tls_validation);
        assert_eq!(left.backend, right.backend);
    }

    #[test]
    fn test_merge_chain_applies_root_to_leaf() {
        let a = parent();
        let b = ExchangeScopeConfig {
            ropc_client_id: Some("leaf-client".to_string()),
            ..Default::default()
        };
        let merged = merge_chain(&[&a, &b]);
        assert_eq!(merged.ropc_client_id.as_deref(), Some("leaf-client"));
        assert_eq!(merged.ropc_username.as_deref(), Some("parent-user"));
    }
}
