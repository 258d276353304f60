//! Gateway error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Broker rejected request ({code}): {message}")]
    Api { code: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("{key} suppressed for {retry_in:?} after repeated failures")]
    Backoff { key: String, retry_in: Duration },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Failures that a later poll may reasonably succeed on.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::HttpClient(_) | Self::Backoff { .. }
        )
    }

    /// Metric outcome label for this error.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Backoff { .. } => "suppressed",
            _ => "error",
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
