//! Shared outbound HTTP plumbing for the protocol adapters
//!
//! Centralizes client construction (timeouts, TLS validation, client
//! certificates), endpoint authentication, and the uniform mapping of
//! transport and protocol failures onto the error taxonomy.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::backend::IssuedToken;
use crate::config::{EndpointAuth, ExchangeConfig};
use crate::error::{ExchangeError, Result};

/// Longest diagnostic body snippet carried in a protocol error, in bytes
const SNIPPET_MAX_BYTES: usize = 256;

/// OAuth2-style token endpoint response
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Build an HTTP client honoring the scope's timeout, TLS validation, and
/// client certificate settings
pub(crate) fn build_client(config: &ExchangeConfig, auth: &EndpointAuth) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(config.http_timeout)
        .connect_timeout(config.http_timeout);

    if !config.tls_validation {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let EndpointAuth::ClientCert {
        cert_pem_path,
        key_pem_path,
    } = auth
    {
        let mut pem = std::fs::read(cert_pem_path).map_err(|e| {
            ExchangeError::unavailable(format!(
                "failed to read client certificate {}: {}",
                cert_pem_path, e
            ))
        })?;
        pem.extend(std::fs::read(key_pem_path).map_err(|e| {
            ExchangeError::unavailable(format!(
                "failed to read client key {}: {}",
                key_pem_path, e
            ))
        })?);
        let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
            ExchangeError::config(format!("invalid client certificate material: {}", e))
        })?;
        builder = builder.identity(identity);
    }

    builder
        .build()
        .map_err(|e| ExchangeError::config(format!("failed to build HTTP client: {}", e)))
}

/// Apply the configured endpoint auth to an outbound request
///
/// `ClientCredentials` performs the preliminary grant against its fixed
/// token endpoint here; that nested acquisition is never cached.
pub(crate) async fn apply_endpoint_auth(
    client: &Client,
    request: RequestBuilder,
    auth: &EndpointAuth,
) -> Result<RequestBuilder> {
    match auth {
        EndpointAuth::None | EndpointAuth::ClientCert { .. } => Ok(request),
        EndpointAuth::Basic {
            client_id,
            client_secret,
        } => Ok(request.basic_auth(client_id, Some(client_secret.expose_secret()))),
        EndpointAuth::ClientCredentials {
            client_id,
            client_secret,
            token_endpoint,
        } => {
            debug!(token_endpoint, "acquiring client-credentials token for endpoint auth");
            let response = client
                .post(token_endpoint)
                .basic_auth(client_id, Some(client_secret.expose_secret()))
                .form(&[("grant_type", "client_credentials")])
                .send()
                .await
                .map_err(map_transport_error)?;
            let (status, body) = read_success(response).await?;
            let issued = parse_token_response(status, &body)?;
            Ok(request.bearer_auth(issued.token))
        }
    }
}

/// Map a reqwest failure onto the taxonomy: anything that kept us from
/// getting a response (connect, timeout, TLS) is `BackendUnavailable`
pub(crate) fn map_transport_error(error: reqwest::Error) -> ExchangeError {
    if error.is_timeout() {
        ExchangeError::unavailable(format!("request timed out: {}", error))
    } else if error.is_connect() {
        ExchangeError::unavailable(format!("connection failed: {}", error))
    } else {
        ExchangeError::unavailable(format!("transport failure: {}", error))
    }
}

/// Read the response body; status >= 400 becomes a protocol error carrying
/// the status and a truncated body snippet
pub(crate) async fn read_success(response: Response) -> Result<(u16, String)> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(map_transport_error)?;
    if status >= 400 {
        return Err(ExchangeError::protocol(status, snippet(&body)));
    }
    Ok((status, body))
}

/// Parse an OAuth2-style JSON token response into an issued token
pub(crate) fn parse_token_response(status: u16, body: &str) -> Result<IssuedToken> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|_| ExchangeError::protocol(status, snippet(body)))?;
    match parsed.access_token {
        Some(token) if !token.is_empty() => Ok(IssuedToken {
            token,
            expires_in: parsed.expires_in.map(Duration::from_secs),
        }),
        _ => Err(ExchangeError::protocol(status, snippet(body))),
    }
}

/// Truncate a body to a diagnostic snippet, respecting char boundaries
pub(crate) fn snippet(body: &str) -> String {
    if body.len() <= SNIPPET_MAX_BYTES {
        return body.to_string();
    }
    let mut end = SNIPPET_MAX_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
