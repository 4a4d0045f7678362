//! Hold error types for the ChainClient and related functionality.

/// Error type for round-addressed chain clients.
#[derive(Debug, thiserror::Error)]
pub enum ChainClientError {
    /// The requested height is not (yet) known to the node.
    #[error("Block not found at height {0}")]
    NotFound(u64),

    /// Transport failure, the node could not be reached or answered with a server error.
    #[error("Network error: {0}")]
    NetworkError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The node answered but the body could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization/Deserialization Errors.
    #[error("Serialization/Deserialization Error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// URL Parse Errors.
    #[error("Invalid URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// Api token could not be used as a header value.
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
}

impl ChainClientError {
    /// Constructor for network errors without an underlying source.
    pub fn network(msg: impl Into<String>) -> Self {
        ChainClientError::NetworkError(msg.into().into())
    }

    /// Returns true if the error marks a height the node does not know.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainClientError::NotFound(_))
    }
}

impl From<reqwest::Error> for ChainClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ChainClientError::InvalidResponse(err.to_string())
        } else {
            ChainClientError::NetworkError(Box::new(err))
        }
    }
}
