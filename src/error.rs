//! Error types for the query layer.

use std::fmt;

/// Result type for query and mutation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the query layer.
///
/// Every fetch and mutation resolves to `Result<T>`. The cache stores the
/// error of a failed fetch in the entry, so `Error` is `Clone`: a single
/// in-flight request may be awaited by several callers and each of them
/// receives its own copy of the outcome.
#[derive(Debug, Clone)]
pub enum Error {
    /// The request could not be sent or did not complete.
    ///
    /// Common causes:
    /// - Connection refused or reset
    /// - DNS failure
    /// - Client-side timeout configured on the transport
    ///
    /// **Recovery:** re-invoke the query's refetch path.
    NetworkError(String),

    /// The endpoint answered with a non-2xx status.
    ///
    /// Carries the HTTP status and the parsed JSON body (`Value::Null` when
    /// the body was empty, a JSON string when it was not valid JSON).
    HttpError {
        /// HTTP status code
        status: u16,
        /// Parsed response body
        body: serde_json::Value,
    },

    /// The response body was not valid JSON or did not match the record shape.
    DecodeError(String),

    /// Query parameters could not be turned into a cache key.
    ///
    /// Raised when params serialize to something other than an object.
    InvalidParams(String),

    /// Transport configuration error (bad base URL, invalid header, ...).
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for a 404 response.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NetworkError(msg) => write!(f, "Network error: {}", msg),
            Error::HttpError { status, body } => {
                if body.is_null() {
                    write!(f, "HTTP error: status {}", status)
                } else {
                    write!(f, "HTTP error: status {}: {}", status, body)
                }
            }
            Error::DecodeError(msg) => write!(f, "Decode error: {}", msg),
            Error::InvalidParams(msg) => write!(f, "Invalid params: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::NetworkError(e.to_string())
        } else {
            Error::DecodeError(e.to_string())
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::DecodeError(e.to_string())
        } else if e.is_builder() {
            Error::ConfigError(e.to_string())
        } else if let Some(status) = e.status() {
            Error::HttpError {
                status: status.as_u16(),
                body: serde_json::Value::Null,
            }
        } else {
            Error::NetworkError(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = Error::DecodeError("expected array".to_string());
        assert_eq!(err.to_string(), "Decode error: expected array");
    }

    #[test]
    fn test_http_error_display_with_body() {
        let err = Error::HttpError {
            status: 422,
            body: json!({"message": "name is required"}),
        };
        assert_eq!(
            err.to_string(),
            r#"HTTP error: status 422: {"message":"name is required"}"#
        );
        assert_eq!(err.status(), Some(422));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found() {
        let err = Error::HttpError {
            status: 404,
            body: serde_json::Value::Null,
        };
        assert_eq!(err.to_string(), "HTTP error: status 404");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::DecodeError(_)));
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(_)));
    }
}
