//! # Error Handling Module
//!
//! All failures the proxy can produce are expressed as variants of [`ProxyError`],
//! built with the `thiserror` crate. Each variant knows which HTTP status it maps
//! to, so route handlers can simply return `ProxyResult<T>` and let Axum turn an
//! `Err` into a structured JSON response.
//!
//! ## How errors flow through the proxy
//!
//! ```text
//! TokenIssuer ──► ProxyError::Credential ──┐
//! Transport   ──► ProxyError::Upstream   ──┼──► FetchGateway ──► ReadThroughCache ──► handler ──► HTTP
//! CacheStore  ──► CacheError (logged, treated as a miss on read)
//! ```
//!
//! ### The `?` Operator
//! Every fallible call in the proxy returns a `Result`, and `?` hands the error
//! back to the caller. The `From` implementations at the bottom of this module
//! let `?` convert library errors (reqwest, serde, io) into `ProxyError`
//! automatically:
//! ```rust,ignore
//! async fn load(path: &str) -> ProxyResult<ProxyConfig> {
//!     let content = tokio::fs::read_to_string(path).await?; // io::Error -> ProxyError::Io
//!     let config = serde_yaml::from_str(&content)?;         // serde_yaml::Error -> ProxyError::Yaml
//!     Ok(config)
//! }
//! ```
//!
//! ### Upstream status propagation
//! Upstream failures keep the status code the taxonomy API answered with (or
//! `None` when no response arrived at all). Callers can therefore distinguish
//! "the node does not exist" (404) from "the API is down" (no status).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::caching::CacheError;

/// Main result type used throughout the proxy
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Error types for the taxonomy proxy
///
/// The `#[error("...")]` attribute from `thiserror` implements `Display` with the
/// given message.
#[derive(Debug, Error, Clone)]
pub enum ProxyError {
    /// The token endpoint rejected the client credentials or could not be reached
    #[error("Credential acquisition failed: {message}")]
    Credential { message: String },

    /// The taxonomy API answered with a non-success status, or did not answer
    #[error("Upstream error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Upstream { status: Option<u16>, message: String },

    /// A cache store operation failed
    #[error("Cache store error: {message}")]
    CacheStore { message: String },

    /// Configuration-related errors (invalid config, missing credentials, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Inbound request validation errors
    #[error("Invalid request: {field} - {reason}")]
    InvalidRequest { field: String, reason: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (file operations, socket binding, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl ProxyError {
    /// Create a credential error with a custom message
    pub fn credential<S: Into<String>>(message: S) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }

    /// Create an upstream error carrying the status the taxonomy API returned
    pub fn upstream_status<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Upstream {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create an upstream error for failures where no response was received
    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a request validation error for the named field
    pub fn invalid_request<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::InvalidRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The upstream status code, when this is an upstream error that received one
    pub fn upstream_status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    /// Get the appropriate HTTP status code for this error
    ///
    /// Upstream "not found" and "bad request" answers are passed through so
    /// clients see the same semantics the taxonomy API gave; everything else
    /// coming from upstream is a bad gateway.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Credential { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { status, .. } => match status {
                Some(404) => StatusCode::NOT_FOUND,
                Some(400) | Some(422) => StatusCode::BAD_REQUEST,
                Some(429) => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::CacheStore { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Json { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Credential { .. } => "credential_error",
            Self::Upstream { .. } => "upstream_error",
            Self::CacheStore { .. } => "cache_store_error",
            Self::Configuration { .. } => "configuration_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ProxyError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// reqwest errors only occur while talking to the taxonomy API, so they map to
/// upstream failures. A status is present when the error came from
/// `error_for_status`.
impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<CacheError> for ProxyError {
    fn from(err: CacheError) -> Self {
        Self::CacheStore {
            message: err.to_string(),
        }
    }
}

/// Convert errors into structured JSON responses for Axum handlers
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
                "upstream_status": self.upstream_status_code(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}
