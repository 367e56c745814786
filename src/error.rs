//! Error types for bibliofabric
//!
//! This module defines the error hierarchy for the whole engine.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Whether an error is worth retrying is decided by
//! [`RetryPolicy`](crate::http::RetryPolicy), since the retryable status
//! set is part of the client configuration.

use std::time::Duration;
use thiserror::Error;

/// The main error type for bibliofabric
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // ============================================================================
    // Transport Errors
    // ============================================================================
    #[error("Network error occurred: {message} (URL: {url})")]
    Network { url: String, message: String },

    #[error("Request timed out after {timeout_ms}ms (URL: {url})")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("API rate limit exceeded (Status: 429, URL: {url})")]
    RateLimited {
        url: String,
        /// Server hint from the `Retry-After` header, if any
        retry_after: Option<Duration>,
    },

    #[error("API request failed with status {status} (URL: {url}): {body}")]
    Api {
        status: u16,
        url: String,
        body: String,
    },

    #[error("{message}")]
    NotFound { message: String },

    #[error("Client is closed")]
    ClientClosed,

    // ============================================================================
    // Client-side Errors
    // ============================================================================
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a client-side validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an API status error
    pub fn api(status: u16, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            url: url.into(),
            body: body.into(),
        }
    }

    /// HTTP status attached to this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Check if this error means the requested resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::Api { status: 404, .. })
    }

    /// Map a reqwest transport failure onto the engine's error kinds
    pub(crate) fn from_transport(err: &reqwest::Error, url: &str, timeout: Duration) -> Self {
        if err.is_timeout() {
            Error::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
        } else {
            Error::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Result type alias for bibliofabric
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
