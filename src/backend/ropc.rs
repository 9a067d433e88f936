//! Resource Owner Password Credentials adapter
//!
//! Obtains a service-level token from credentials held in configuration.
//! The caller's source token is not part of the grant itself; a host that
//! wants it forwarded configures it as an extra request parameter.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::backend::{http, IssuedToken, TokenBackend};
use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, Result};

/// OAuth2 password-grant adapter
pub struct RopcBackend;

#[async_trait]
impl TokenBackend for RopcBackend {
    async fn exchange(&self, _source_token: &str, config: &ExchangeConfig) -> Result<IssuedToken> {
        let ropc = config
            .ropc
            .as_ref()
            .ok_or_else(|| ExchangeError::config("ropc backend selected without settings"))?;

        debug!(endpoint = %ropc.endpoint, client_id = %ropc.client_id, "posting ROPC grant");

        let mut form: Vec<(String, String)> = vec![
            ("grant_type".to_string(), "password".to_string()),
            ("username".to_string(), ropc.username.clone()),
            ("password".to_string(), ropc.password.expose_secret().clone()),
            ("client_id".to_string(), ropc.client_id.clone()),
        ];
        form.extend(config.request_parameters.iter().cloned());

        let client = http::build_client(config, &ropc.endpoint_auth)?;
        let request = client.post(&ropc.endpoint).form(&form);
        let request = http::apply_endpoint_auth(&client, request, &ropc.endpoint_auth).await?;

        let response = request.send().await.map_err(http::map_transport_error)?;
        let (status, body) = http::read_success(response).await?;
        http::parse_token_response(status, &body)
    }
}
