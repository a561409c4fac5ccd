//! recsys-proxy-cache error types

use std::time::Duration;

/// Errors produced by the proxy cache, its backend and its resolver.
#[derive(Debug, thiserror::Error)]
pub enum ProxyCacheError {
    // Request errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Backend errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("backend call exceeded its {0:?} budget")]
    BackendTimeout(Duration),

    /// Cache and backend together produced fewer scores than were requested.
    ///
    /// The whole request fails; no partial response is ever returned.
    #[error(
        "cache and backend combined returned fewer scores than requested; \
         investigate integrity of the proxy and the cache. \
         items: {items:?} scores: {scores:?} missing: {missing}"
    )]
    Integrity {
        items: Vec<i64>,
        scores: Vec<f64>,
        missing: usize,
    },

    // Discovery errors
    #[error("malformed endpoint '{0}': expected host:port")]
    MalformedEndpoint(String),

    /// No endpoint was ever resolved within the first-resolution wait.
    #[error("no backend endpoints resolved after waiting {0:?}")]
    NoEndpoints(Duration),

    #[error("discovery error: {0}")]
    Discovery(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown hash function '{0}'")]
    UnknownHashFunction(String),

    #[error("component has been shut down")]
    Shutdown,
}

impl From<reqwest::Error> for ProxyCacheError {
    fn from(err: reqwest::Error) -> Self {
        ProxyCacheError::Http(err.to_string())
    }
}

/// Result type alias for proxy cache operations
pub type Result<T> = std::result::Result<T, ProxyCacheError>;
