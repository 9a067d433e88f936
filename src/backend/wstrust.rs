//! WS-Trust 1.3 protocol adapter
//!
//! Posts a SOAP 1.2 `RequestSecurityToken` (Issue) envelope embedding the
//! source token and parses the issued token out of the
//! `RequestSecurityTokenResponse`. The issued token is opaque to this
//! crate: plain text content is returned as-is, an XML-valued token (e.g.
//! a SAML assertion) is returned as its raw XML string.

use async_trait::async_trait;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::backend::{http, IssuedToken, TokenBackend};
use crate::config::{ExchangeConfig, WsTrustConfig};
use crate::error::{ExchangeError, Result};

const ACTION_ISSUE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/RST/Issue";
const REQUEST_TYPE_ISSUE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Issue";
const KEY_TYPE_BEARER: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Bearer";

const NS_SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";
const NS_TRUST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512";
const NS_ADDRESSING: &str = "http://www.w3.org/2005/08/addressing";
const NS_POLICY: &str = "http://schemas.xmlsoap.org/ws/2004/09/policy";
const NS_WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const ENCODING_BASE64: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// WS-Trust RequestSecurityToken adapter
pub struct WsTrustBackend;

#[async_trait]
impl TokenBackend for WsTrustBackend {
    async fn exchange(&self, source_token: &str, config: &ExchangeConfig) -> Result<IssuedToken> {
        let wstrust = config
            .wstrust
            .as_ref()
            .ok_or_else(|| ExchangeError::config("wstrust backend selected without settings"))?;

        let envelope = build_rst_envelope(source_token, wstrust);
        debug!(
            endpoint = %wstrust.endpoint,
            applies_to = %wstrust.applies_to,
            "posting WS-Trust RequestSecurityToken"
        );

        let client = http::build_client(config, &wstrust.endpoint_auth)?;
        // form-encoded backends carry extra parameters in the body; for
        // SOAP they travel as query parameters on the endpoint URL
        let mut request = client
            .post(&wstrust.endpoint)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(envelope);
        if !config.request_parameters.is_empty() {
            request = request.query(&config.request_parameters);
        }
        let request = http::apply_endpoint_auth(&client, request, &wstrust.endpoint_auth).await?;

        let response = request.send().await.map_err(http::map_transport_error)?;
        let (status, body) = http::read_success(response).await?;

        let token = extract_issued_token(&body, status)?;
        Ok(IssuedToken {
            token,
            expires_in: None,
        })
    }
}

/// Build the SOAP 1.2 RST Issue envelope embedding the source token
fn build_rst_envelope(source_token: &str, config: &WsTrustConfig) -> String {
    let value_type_attr = if config.value_type.is_empty() {
        String::new()
    } else {
        format!(" ValueType=\"{}\"", escape(&config.value_type))
    };

    format!(
        concat!(
            "<s:Envelope xmlns:s=\"{ns_soap}\" xmlns:a=\"{ns_addr}\">",
            "<s:Header>",
            "<a:Action s:mustUnderstand=\"1\">{action}</a:Action>",
            "<a:To s:mustUnderstand=\"1\">{endpoint}</a:To>",
            "</s:Header>",
            "<s:Body>",
            "<trust:RequestSecurityToken xmlns:trust=\"{ns_trust}\">",
            "<trust:TokenType>{token_type}</trust:TokenType>",
            "<trust:RequestType>{request_type}</trust:RequestType>",
            "<wsp:AppliesTo xmlns:wsp=\"{ns_policy}\">",
            "<a:EndpointReference><a:Address>{applies_to}</a:Address></a:EndpointReference>",
            "</wsp:AppliesTo>",
            "<trust:OnBehalfOf>",
            "<wsse:BinarySecurityToken xmlns:wsse=\"{ns_wsse}\"",
            " EncodingType=\"{encoding}\"{value_type_attr}>{token}</wsse:BinarySecurityToken>",
            "</trust:OnBehalfOf>",
            "<trust:KeyType>{key_type}</trust:KeyType>",
            "</trust:RequestSecurityToken>",
            "</s:Body>",
            "</s:Envelope>",
        ),
        ns_soap = NS_SOAP,
        ns_addr = NS_ADDRESSING,
        ns_trust = NS_TRUST,
        ns_policy = NS_POLICY,
        ns_wsse = NS_WSSE,
        action = ACTION_ISSUE,
        request_type = REQUEST_TYPE_ISSUE,
        key_type = KEY_TYPE_BEARER,
        encoding = ENCODING_BASE64,
        endpoint = escape(&config.endpoint),
        token_type = escape(&config.token_type),
        applies_to = escape(&config.applies_to),
        value_type_attr = value_type_attr,
        token = escape(source_token),
    )
}

/// Extract the issued security token from a RequestSecurityTokenResponse
///
/// Handles the three shapes STS implementations produce inside
/// `RequestedSecurityToken`: bare text, a single wrapper element holding
/// text (e.g. `BinarySecurityToken`), or a full XML token such as a SAML
/// assertion, which is returned as raw XML.
fn extract_issued_token(body: &str, status: u16) -> Result<String> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"Fault" => {
                return Err(ExchangeError::protocol(
                    status,
                    format!("SOAP fault: {}", fault_text(&mut reader)),
                ));
            }
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"RequestedSecurityToken" => {
                return read_token_contents(&mut reader, status);
            }
            Ok(Event::Eof) => {
                return Err(ExchangeError::protocol(
                    status,
                    format!(
                        "no RequestedSecurityToken in response: {}",
                        http::snippet(body)
                    ),
                ));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ExchangeError::protocol(
                    status,
                    format!("malformed SOAP response: {}", e),
                ));
            }
        }
    }
}

/// Read everything up to the matching RequestedSecurityToken end tag
fn read_token_contents(reader: &mut Reader<&[u8]>, status: u16) -> Result<String> {
    let mut inner = Writer::new(Vec::new());
    let mut text = String::new();
    let mut depth: usize = 0;
    let mut direct_children = 0;
    let mut has_grandchildren = false;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(ExchangeError::protocol(
                    status,
                    format!("malformed SOAP response: {}", e),
                ));
            }
        };
        match event {
            Event::Start(e) => {
                if depth == 0 {
                    direct_children += 1;
                } else {
                    has_grandchildren = true;
                }
                depth += 1;
                write_inner(&mut inner, Event::Start(e), status)?;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    direct_children += 1;
                } else {
                    has_grandchildren = true;
                }
                write_inner(&mut inner, Event::Empty(e), status)?;
            }
            Event::Text(t) => {
                let unescaped = t.unescape().map_err(|e| {
                    ExchangeError::protocol(status, format!("malformed SOAP response: {}", e))
                })?;
                text.push_str(&unescaped);
                write_inner(&mut inner, Event::Text(t), status)?;
            }
            Event::CData(c) => {
                text.push_str(&String::from_utf8_lossy(c.as_ref()));
                write_inner(&mut inner, Event::CData(c), status)?;
            }
            Event::End(e) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                write_inner(&mut inner, Event::End(e), status)?;
            }
            Event::Eof => {
                return Err(ExchangeError::protocol(
                    status,
                    "truncated SOAP response".to_string(),
                ));
            }
            _ => {}
        }
    }

    let trimmed = text.trim();
    // a single wrapper element with only text inside carries the token as
    // its text; anything more structured is an XML token, returned raw
    if direct_children == 0 || (direct_children == 1 && !has_grandchildren) {
        if trimmed.is_empty() {
            return Err(ExchangeError::protocol(
                status,
                "empty RequestedSecurityToken in response".to_string(),
            ));
        }
        return Ok(trimmed.to_string());
    }

    let raw = String::from_utf8(inner.into_inner()).map_err(|_| {
        ExchangeError::protocol(status, "non-UTF8 RequestedSecurityToken".to_string())
    })?;
    Ok(raw)
}

fn write_inner(writer: &mut Writer<Vec<u8>>, event: Event<'_>, status: u16) -> Result<()> {
    writer.write_event(event).map_err(|e| {
        ExchangeError::protocol(status, format!("malformed SOAP response: {}", e))
    })
}

/// Collect the human-readable text inside a SOAP Fault element
fn fault_text(reader: &mut Reader<&[u8]>) -> String {
    let mut text = String::new();
    let mut depth: usize = 0;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::Text(t)) => {
                if let Ok(unescaped) = t.unescape() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(unescaped.trim());
                }
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }
    text
}
