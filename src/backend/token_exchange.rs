//! OAuth2 token exchange adapter (RFC 8693)

use async_trait::async_trait;
use tracing::debug;

use crate::backend::{http, IssuedToken, TokenBackend};
use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, Result};

/// Token exchange grant type (RFC 8693)
pub const GRANT_TYPE_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// Subject token type sent with every exchange; the URN for an opaque
/// access token
pub const SUBJECT_TOKEN_TYPE_ACCESS_TOKEN: &str = "urn:ietf:params:oauth:token-type:access_token";

/// RFC 8693 token exchange adapter
pub struct TokenExchangeBackend;

#[async_trait]
impl TokenBackend for TokenExchangeBackend {
    async fn exchange(&self, source_token: &str, config: &ExchangeConfig) -> Result<IssuedToken> {
        let otx = config.token_exchange.as_ref().ok_or_else(|| {
            ExchangeError::config("token_exchange backend selected without settings")
        })?;

        debug!(endpoint = %otx.endpoint, client_id = %otx.client_id, "posting token exchange grant");

        let mut form: Vec<(String, String)> = vec![
            (
                "grant_type".to_string(),
                GRANT_TYPE_TOKEN_EXCHANGE.to_string(),
            ),
            ("subject_token".to_string(), source_token.to_string()),
            (
                "subject_token_type".to_string(),
                SUBJECT_TOKEN_TYPE_ACCESS_TOKEN.to_string(),
            ),
            ("client_id".to_string(), otx.client_id.clone()),
        ];
        form.extend(config.request_parameters.iter().cloned());

        let client = http::build_client(config, &otx.endpoint_auth)?;
        let request = client.post(&otx.endpoint).form(&form);
        let request = http::apply_endpoint_auth(&client, request, &otx.endpoint_auth).await?;

        let response = request.send().await.map_err(http::map_transport_error)?;
        let (status, body) = http::read_success(response).await?;
        http::parse_token_response(status, &body)
    }
}
