//! Error types for calls against the node's control API

use std::time::Duration;
use thiserror::Error;

/// Boxed cause of a transport-level failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a single control API call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, request or body read failure
    #[error("request to {command} failed: {source}")]
    Transport {
        /// Command path that was called
        command: String,
        /// Underlying cause
        #[source]
        source: BoxError,
    },
    /// The call deadline elapsed
    #[error("request to {command} timed out after {after:?}")]
    Timeout {
        /// Command path that was called
        command: String,
        /// Configured deadline
        after: Duration,
    },
    /// The response body carried an error envelope
    #[error("{message}")]
    Api {
        /// Command path that was called
        command: String,
        /// Classified error text
        message: String,
        /// Raw response body
        body: String,
    },
    /// Non-success HTTP status without a readable error envelope
    #[error("{command} returned HTTP {status}")]
    Status {
        /// Command path that was called
        command: String,
        /// HTTP status code
        status: u16,
    },
    /// The endpoint could not be turned into a request URL
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ApiError {
    /// Error text reported by the node, if this is an API-level error.
    pub fn api_message(&self) -> Option<&str> {
        match self {
            ApiError::Api { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout { .. })
    }

    pub fn transport(command: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ApiError::Transport {
            command: command.into(),
            source: source.into(),
        }
    }
}

/// Result alias for control API calls.
pub type ApiResult<T> = Result<T, ApiError>;
