//! HTTP transport with an optional forwarding relay.
//!
//! Everything the client says on the wire goes through [`Transport`]. In
//! direct mode a request is executed as-is; in relay mode it is wrapped in a
//! JSON envelope and POSTed to the relay, which performs the outbound call
//! and hands back the target's status, headers, and body. The relay cannot
//! set cookies on our behalf, so it forwards `Set-Cookie` values in a
//! `forward-cookie` header; the transport surfaces those under both names so
//! the session layer reads one shape in either mode.
//!
//! [`HttpExchange`] is the seam tests script: the production implementation
//! is reqwest, scenario tests substitute a scripted exchange.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::ServiceConfig;
use crate::error::{ClientError, ClientResult};

/// A boxed future for async trait methods, keeping [`HttpExchange`]
/// object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Request methods the protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing request: method, target, headers, optional JSON body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: Url) -> Self {
        Self {
            method: HttpMethod::Post,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_json_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// One response: status, headers with lowercased names, raw body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header, by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, by case-insensitive name.
    pub fn headers_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .filter(move |(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every cookie string set by this response, whether it arrived as a
    /// direct `Set-Cookie` or folded into a relay `forward-cookie` value.
    pub fn set_cookie_values(&self) -> Vec<String> {
        let mut cookies: Vec<String> = self
            .headers_named("set-cookie")
            .map(str::to_string)
            .collect();
        for forwarded in self.headers_named("forward-cookie") {
            for cookie in split_forwarded_cookies(forwarded) {
                if !cookies.contains(&cookie) {
                    cookies.push(cookie);
                }
            }
        }
        cookies
    }

    /// Decodes the body, reporting a protocol error when it does not match
    /// the expected shape.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_slice(&self.body).map_err(|err| {
            ClientError::protocol(format!("response body did not match expected shape: {err}"))
        })
    }
}

/// Executes one HTTP request. Object-safe so tests can script the wire.
pub trait HttpExchange: Send + Sync {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, ClientResult<HttpResponse>>;
}

/// Production exchange backed by reqwest.
#[derive(Debug)]
pub struct ReqwestExchange {
    http_client: reqwest::Client,
}

impl ReqwestExchange {
    pub fn new(config: &ServiceConfig) -> ClientResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| {
                ClientError::internal("failed to create HTTP client").with_source(err)
            })?;
        Ok(Self { http_client })
    }
}

impl HttpExchange for ReqwestExchange {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, ClientResult<HttpResponse>> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.http_client.get(request.url.clone()),
                HttpMethod::Post => self.http_client.post(request.url.clone()),
            };
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = &request.body {
                let bytes = serde_json::to_vec(body).map_err(|err| {
                    ClientError::internal("failed to encode request body").with_source(err)
                })?;
                builder = builder.body(bytes);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    ClientError::transport("request timeout")
                } else if e.is_connect() {
                    ClientError::transport(format!("connection failed: {e}"))
                } else {
                    ClientError::transport(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let mut headers = Vec::new();
            for (name, value) in response.headers() {
                match value.to_str() {
                    Ok(value) => headers.push((name.as_str().to_string(), value.to_string())),
                    Err(_) => warn!(header = %name, "dropping non-text header value"),
                }
            }
            let body = response
                .bytes()
                .await
                .map_err(|e| ClientError::transport(format!("failed to read body: {e}")))?;

            Ok(HttpResponse::new(status, headers, body.to_vec()))
        })
    }
}

/// The wrapped request a relay expects in its POST body.
#[derive(Debug, Serialize)]
struct RelayEnvelope {
    method: &'static str,
    headers: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
}

/// Routes requests either straight out or through the forwarding relay.
pub struct Transport {
    exchange: Arc<dyn HttpExchange>,
    relay_url: Option<Url>,
}

impl Transport {
    pub fn new(exchange: Arc<dyn HttpExchange>, relay_url: Option<Url>) -> Self {
        Self {
            exchange,
            relay_url,
        }
    }

    /// Builds the production transport for the given service config.
    pub fn from_config(config: &ServiceConfig) -> ClientResult<Self> {
        Ok(Self::new(
            Arc::new(ReqwestExchange::new(config)?),
            config.relay_url.clone(),
        ))
    }

    /// Executes a request, unwrapping relay framing when configured.
    pub async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        debug!(
            method = %request.method,
            url = %request.url,
            relayed = self.relay_url.is_some(),
            "sending request"
        );
        let response = match &self.relay_url {
            None => self.exchange.execute(request).await?,
            Some(relay_url) => {
                let wrapped = wrap_for_relay(relay_url, request);
                let response = self.exchange.execute(wrapped).await?;
                unwrap_relay_response(response)
            }
        };
        debug!(status = response.status, "response received");
        Ok(response)
    }
}

/// Wraps a request in the relay envelope, moving the target into the
/// relay's `url` query parameter.
fn wrap_for_relay(relay_url: &Url, request: HttpRequest) -> HttpRequest {
    let mut outer_url = relay_url.clone();
    outer_url
        .query_pairs_mut()
        .append_pair("url", request.url.as_str());

    let mut headers = serde_json::Map::new();
    for (name, value) in request.headers {
        headers.insert(name, Value::String(value));
    }
    let envelope = RelayEnvelope {
        method: request.method.as_str(),
        headers,
        body: request.body,
    };
    let body = serde_json::to_value(&envelope)
        .expect("relay envelope of strings and JSON serializes");

    HttpRequest::post(outer_url)
        .with_header("Content-Type", "application/json")
        .with_json_body(body)
}

/// Normalizes a relayed response: cookies forwarded as `forward-cookie`
/// are surfaced under `set-cookie` as well, and framing headers that no
/// longer describe the relayed body are dropped.
fn unwrap_relay_response(response: HttpResponse) -> HttpResponse {
    let mut headers = Vec::with_capacity(response.headers.len());
    for (name, value) in response.headers {
        match name.as_str() {
            "content-encoding" | "content-length" => continue,
            "forward-cookie" => {
                for cookie in split_forwarded_cookies(&value) {
                    headers.push(("set-cookie".to_string(), cookie));
                }
                headers.push((name, value));
            }
            _ => headers.push((name, value)),
        }
    }
    HttpResponse {
        status: response.status,
        headers,
        body: response.body,
    }
}

/// Splits a header value holding several comma-joined cookies.
///
/// A comma only separates cookies when what follows looks like a new
/// `name=` pair; commas inside `Expires` dates stay put.
pub(crate) fn split_forwarded_cookies(value: &str) -> Vec<String> {
    let mut cookies = Vec::new();
    let mut start = 0;
    let bytes = value.as_bytes();
    for (idx, &byte) in bytes.iter().enumerate() {
        if byte != b',' {
            continue;
        }
        let rest = value[idx + 1..].trim_start();
        if starts_new_cookie(rest) {
            let cookie = value[start..idx].trim();
            if !cookie.is_empty() {
                cookies.push(cookie.to_string());
            }
            start = idx + 1;
        }
    }
    let last = value[start..].trim();
    if !last.is_empty() {
        cookies.push(last.to_string());
    }
    cookies
}

/// True when the text begins with a `name=` cookie pair. A date fragment
/// like `21 Oct 2026 07:28:00 GMT` has no `=` before a space or `;`.
fn starts_new_cookie(text: &str) -> bool {
    for (idx, ch) in text.char_indices() {
        match ch {
            '=' => return idx > 0,
            ';' | ',' | ' ' => return false,
            _ => {}
        }
    }
    false
}

/// Joins a path onto a service base without disturbing its existing path.
pub(crate) fn endpoint(base: &Url, path: &str) -> ClientResult<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined)
        .map_err(|err| ClientError::internal(format!("invalid endpoint {joined:?}")).with_source(err))
}

/// Maps a read-style response status: 2xx passes, 421 is a stale session,
/// anything else is a protocol violation.
pub(crate) fn check_status(status: u16, what: &str) -> ClientResult<()> {
    match status {
        status if (200..300).contains(&status) => Ok(()),
        421 => Err(ClientError::stale_session(format!(
            "{what} refused: session cookies expired"
        ))),
        status => Err(ClientError::protocol(format!(
            "{what} failed with status {status}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_plain_cookies() {
        let cookies = split_forwarded_cookies("a=1; Path=/, b=2; Secure");
        assert_eq!(cookies, vec!["a=1; Path=/", "b=2; Secure"]);
    }

    #[test]
    fn split_keeps_expires_dates_whole() {
        let value =
            "X-SESSION=abc; Expires=Wed, 21 Oct 2026 07:28:00 GMT; Path=/, X-TRUST=def; Secure";
        let cookies = split_forwarded_cookies(value);
        assert_eq!(
            cookies,
            vec![
                "X-SESSION=abc; Expires=Wed, 21 Oct 2026 07:28:00 GMT; Path=/",
                "X-TRUST=def; Secure"
            ]
        );
    }

    #[test]
    fn split_single_cookie() {
        let cookies = split_forwarded_cookies("only=one; HttpOnly");
        assert_eq!(cookies, vec!["only=one; HttpOnly"]);
    }

    #[test]
    fn relay_wrapping_moves_target_into_query() {
        let relay = Url::parse("https://relay.example.com/forward").unwrap();
        let inner = HttpRequest::post(Url::parse("https://service.example.com/signin").unwrap())
            .with_header("Accept", "application/json")
            .with_json_body(serde_json::json!({"accountName": "u"}));

        let wrapped = wrap_for_relay(&relay, inner);
        assert_eq!(wrapped.method, HttpMethod::Post);
        assert_eq!(
            wrapped.url.as_str(),
            "https://relay.example.com/forward?url=https%3A%2F%2Fservice.example.com%2Fsignin"
        );

        let envelope = wrapped.body.unwrap();
        assert_eq!(envelope["method"], "POST");
        assert_eq!(envelope["headers"]["Accept"], "application/json");
        assert_eq!(envelope["body"]["accountName"], "u");
    }

    #[test]
    fn relay_unwrapping_surfaces_cookies_and_strips_framing() {
        let response = HttpResponse::new(
            200,
            vec![
                ("Content-Encoding".to_string(), "gzip".to_string()),
                ("Content-Length".to_string(), "123".to_string()),
                (
                    "forward-cookie".to_string(),
                    "a=1; Path=/, b=2; Secure".to_string(),
                ),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            b"{}".to_vec(),
        );
        let unwrapped = unwrap_relay_response(response);

        assert!(unwrapped.header("content-encoding").is_none());
        assert!(unwrapped.header("content-length").is_none());
        assert_eq!(unwrapped.header("content-type"), Some("application/json"));
        // Forwarded cookies visible under both names.
        let set: Vec<_> = unwrapped.headers_named("set-cookie").collect();
        assert_eq!(set, vec!["a=1; Path=/", "b=2; Secure"]);
        assert!(unwrapped.header("forward-cookie").is_some());
    }

    #[test]
    fn set_cookie_values_merges_both_names() {
        let response = HttpResponse::new(
            200,
            vec![
                ("set-cookie".to_string(), "direct=1; Path=/".to_string()),
                ("forward-cookie".to_string(), "relayed=2".to_string()),
            ],
            Vec::new(),
        );
        assert_eq!(
            response.set_cookie_values(),
            vec!["direct=1; Path=/", "relayed=2"]
        );
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(
            409,
            vec![("X-Thing".to_string(), "v".to_string())],
            Vec::new(),
        );
        assert_eq!(response.header("x-thing"), Some("v"));
        assert_eq!(response.header("X-THING"), Some("v"));
        assert!(!response.is_success());
    }

    #[test]
    fn endpoint_join_keeps_base_path() {
        let base = Url::parse("https://service.example.com/setup/ws/1").unwrap();
        let url = endpoint(&base, "accountLogin").unwrap();
        assert_eq!(
            url.as_str(),
            "https://service.example.com/setup/ws/1/accountLogin"
        );

        let trailing = Url::parse("https://service.example.com/ca/").unwrap();
        let url = endpoint(&trailing, "/startup").unwrap();
        assert_eq!(url.as_str(), "https://service.example.com/ca/startup");
    }

    #[test]
    fn json_decode_failure_is_protocol_error() {
        let response = HttpResponse::new(200, Vec::new(), b"not json".to_vec());
        let err = response.json::<serde_json::Value>().unwrap_err();
        assert_eq!(err.code(), crate::error::ClientErrorCode::Protocol);
    }

    #[test]
    fn status_check_accepts_2xx_only() {
        assert!(check_status(200, "probe").is_ok());
        assert!(check_status(204, "probe").is_ok());
    }

    #[test]
    fn status_421_is_a_typed_stale_session() {
        let err = check_status(421, "probe").unwrap_err();
        assert_eq!(err.code(), crate::error::ClientErrorCode::StaleSession);
        assert!(err.is_recoverable());
    }

    #[test]
    fn other_status_failures_are_protocol_errors() {
        let err = check_status(500, "probe").unwrap_err();
        assert_eq!(err.code(), crate::error::ClientErrorCode::Protocol);
    }
}
