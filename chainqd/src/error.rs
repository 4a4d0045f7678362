//! Hold error types for the Indexer and related functionality.

use chainq_state::error::{ApiError, ApiServiceError, FetchError};

/// Chainq daemon errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// Configuration errors.
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// ApiService startup errors.
    #[error("ApiService error: {0}")]
    ApiServiceError(#[from] ApiServiceError),
    /// Chain api errors outside of block fetching.
    #[error("Api error: {0}")]
    ApiError(#[from] ApiError),
    /// Block fetch pipeline errors.
    #[error("Fetch error: {0}")]
    FetchError(#[from] FetchError),
    /// Returned from tokio joinhandles.
    #[error("Join handle error: {0}")]
    TokioJoinError(#[from] tokio::task::JoinError),
}
