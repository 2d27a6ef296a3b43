//! Error types for the search client

use thiserror::Error;

/// Search client errors
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shard {0} is not available")]
    UnknownShard(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Invalid query parameter(s): {}", .0.join(","))]
    InvalidParameters(Vec<String>),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Index {index} out of range for result set of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Manifest error: {0}")]
    ManifestError(String),

    #[error("Unsupported checksum type: {0}")]
    UnsupportedChecksum(String),
}

impl SearchError {
    pub fn config(msg: impl Into<String>) -> Self {
        SearchError::ConfigError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        SearchError::ProtocolError(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        SearchError::TransportError(msg.into())
    }

    /// True for errors raised by caller misuse rather than by the remote side
    pub fn is_config(&self) -> bool {
        matches!(self, SearchError::ConfigError(_) | SearchError::UnknownShard(_))
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::SerializationError(err.to_string())
    }
}

impl From<config::ConfigError> for SearchError {
    fn from(err: config::ConfigError) -> Self {
        SearchError::ConfigError(err.to_string())
    }
}

impl From<url::ParseError> for SearchError {
    fn from(err: url::ParseError) -> Self {
        SearchError::ConfigError(format!("Invalid URL: {}", err))
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::TransportError(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            SearchError::TransportError(format!("Connection failed: {}", err))
        } else {
            SearchError::TransportError(err.to_string())
        }
    }
}

/// Result type for search client operations
pub type SearchResult<T> = Result<T, SearchError>;
