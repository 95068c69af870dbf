//! reqwest-backed transport for a real JSON API.

use super::{ApiRequest, Method, Transport};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for [`HttpTransport`].
///
/// Deserializable so applications can embed it in their own config files:
///
/// ```toml
/// base_url = "https://dashboard.example.com/"
/// timeout_ms = 10000
///
/// [default_headers]
/// authorization = "Bearer ..."
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct HttpConfig {
    /// Origin (and optional path prefix) every resource path is resolved against.
    pub base_url: String,
    /// Whole-request timeout. No timeout when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Headers sent with every request.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpConfig {
            base_url: base_url.into(),
            timeout_ms: None,
            default_headers: BTreeMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }
}

/// Transport that sends each [`ApiRequest`] over HTTP with reqwest.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    /// Build a transport from its configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` for an unparsable base URL or header.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut base = Url::parse(&config.base_url)
            .map_err(|e| Error::ConfigError(format!("invalid base URL {}: {}", config.base_url, e)))?;
        // Resource paths are resolved relative to the prefix, which needs a trailing slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::ConfigError(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::ConfigError(format!("invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        let mut builder = Client::builder()
            .user_agent(Self::user_agent())
            .default_headers(headers);
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder.build()?;

        info!("✓ HTTP transport ready for {}", base);
        Ok(HttpTransport { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("query-kit/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for `request`, query string included.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` when the path cannot be joined.
    pub fn url(&self, request: &ApiRequest) -> Result<Url> {
        let relative = request.base_path.trim_matches('/');
        let mut url = self
            .base
            .join(relative)
            .map_err(|e| Error::ConfigError(format!("invalid path {}: {}", request.base_path, e)))?;

        if let Some(id) = &request.id {
            url.path_segments_mut()
                .map_err(|_| Error::ConfigError(format!("base URL cannot take a path: {}", self.base)))?
                .push(id);
        }

        url.set_query(None);
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &request.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        let url = self.url(&request)?;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut req = self.client.request(method, url);
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        if !status.is_success() {
            let body = parse_error_body(&bytes);
            debug!("✗ HTTP {} -> {}", request, status);
            return Err(Error::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        debug!("✓ HTTP {} -> {}", request, status);
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::DecodeError(format!("failed to parse body of {}: {}", request, e)))
    }
}

/// Error bodies: JSON when possible, the raw text otherwise, `Null` when empty.
fn parse_error_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(HttpConfig::new(base)).expect("Failed to build transport")
    }

    #[test]
    fn test_url_with_id_and_query() {
        let transport = transport("http://localhost:8080");
        let request = ApiRequest::new(Method::Get, "/api/bids")
            .with_id("b 1")
            .with_query(vec![
                ("status".to_string(), "draft".to_string()),
                ("tag".to_string(), "a&b".to_string()),
            ]);

        let url = transport.url(&request).expect("Failed to build URL");
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/bids/b%201?status=draft&tag=a%26b"
        );
    }

    #[test]
    fn test_url_keeps_base_prefix() {
        let transport = transport("http://localhost:8080/v1");
        let request = ApiRequest::new(Method::Delete, "/equipment/").with_id("7");

        let url = transport.url(&request).expect("Failed to build URL");
        assert_eq!(url.as_str(), "http://localhost:8080/v1/equipment/7");
    }

    #[test]
    fn test_invalid_config() {
        let err = HttpTransport::new(HttpConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));

        let err = HttpTransport::new(
            HttpConfig::new("http://localhost").with_header("bad header", "x"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_config_deserialize() {
        let config: HttpConfig = serde_json::from_value(json!({
            "base_url": "http://localhost:3000/",
            "default_headers": {"authorization": "Bearer token"}
        }))
        .expect("Failed to deserialize");

        assert_eq!(config.timeout_ms, None);
        assert_eq!(config.default_headers["authorization"], "Bearer token");
    }

    #[test]
    fn test_parse_error_body() {
        assert_eq!(parse_error_body(b""), Value::Null);
        assert_eq!(parse_error_body(br#"{"message":"nope"}"#), json!({"message": "nope"}));
        assert_eq!(parse_error_body(b"Bad Gateway"), json!("Bad Gateway"));
    }
}
