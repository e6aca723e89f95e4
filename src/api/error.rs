//! Error taxonomy for chain API calls.

use thiserror::Error;

/// Failure of a single chain API request.
#[derive(Debug, Clone, Error)]
pub enum ChainApiError {
    /// Upstream asked us to slow down (HTTP 429 or equivalent).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Timeout, connection reset, DNS failure.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status that is not a rate limit.
    #[error("request failed: {status} - {body}")]
    Http { status: u16, body: String },

    /// Payload did not have the fields we need.
    #[error("unexpected payload shape: {0}")]
    DataShape(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl ChainApiError {
    /// Whether the request is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            ChainApiError::RateLimited(_) | ChainApiError::Network(_) => true,
            ChainApiError::Http { status, .. } => *status >= 500,
            ChainApiError::DataShape(_) | ChainApiError::NotFound(_) => false,
        }
    }

    /// Classify an HTTP status with its response body.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => ChainApiError::RateLimited(body),
            404 => ChainApiError::NotFound(body),
            _ => ChainApiError::Http { status, body },
        }
    }
}

impl From<reqwest::Error> for ChainApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ChainApiError::from_status(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return ChainApiError::DataShape(err.to_string());
        }
        ChainApiError::Network(err.to_string())
    }
}
