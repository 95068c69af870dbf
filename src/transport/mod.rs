//! Transport implementations for the REST boundary.
//!
//! The query layer never talks HTTP directly. Every read and mutation is
//! described as an [`ApiRequest`] and handed to a [`Transport`], which
//! returns the decoded JSON body or an [`Error`](crate::Error):
//!
//! - `NetworkError` when the request could not be completed,
//! - `HttpError { status, body }` for non-2xx answers,
//! - `DecodeError` when the body is not JSON.
//!
//! Implementations: [`InMemoryTransport`] (default feature `inmemory`, for
//! tests and demos) and `HttpTransport` (feature `http`, backed by reqwest).

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "inmemory")]
pub mod inmemory;

#[cfg(feature = "http")]
pub use http::{HttpConfig, HttpTransport};
#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryTransport;

/// HTTP methods used by resource operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Patch => write!(f, "PATCH"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// One request against a resource endpoint:
/// `{method} {base_path}[/{id}][?query]` with an optional JSON body.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub base_path: String,
    pub id: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, base_path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            base_path: base_path.into(),
            id: None,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Path without query string, e.g. `/api/bids/17`.
    pub fn path(&self) -> String {
        let base = self.base_path.trim_end_matches('/');
        match &self.id {
            Some(id) => format!("{}/{}", base, id),
            None => base.to_string(),
        }
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())?;
        if !self.query.is_empty() {
            let query: Vec<String> = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "?{}", query.join("&"))?;
        }
        Ok(())
    }
}

/// Trait for the REST endpoint behind a resource.
///
/// Abstracts the network, allowing swappable transports.
/// `Send + Sync` and object-safe: resources hold an `Arc<dyn Transport>`.
///
/// # Returns
/// - `Ok(body)` - 2xx response, body decoded as JSON (`Value::Null` if empty)
///
/// # Errors
/// - `Error::NetworkError` - request could not be sent or completed
/// - `Error::HttpError` - non-2xx status, with the parsed body
/// - `Error::DecodeError` - body is not valid JSON
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Value>;
}
