//! Holds error types for chainq-state.

use chainq_fetch::{chain::error::ChainClientError, jsonrpc::error::JsonRpcConnectorError};

use crate::{status::ConnectionState, types::BlockHash};

/// Errors returned by a [`ChainApi`](crate::rpc::ChainApi).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Operation issued while the api is not active.
    #[error("Api not connected: {method} called while {state}")]
    NotConnected {
        /// Rpc method name.
        method: String,
        /// Connection state at the time of the call.
        state: ConnectionState,
    },

    /// Block number does not exist on the chain.
    #[error("Block {0} not found")]
    NotFound(u64),

    /// Hash was never produced by this api or has since been evicted.
    #[error("Missing block: {0}")]
    MissingBlock(BlockHash),

    /// Method is not part of the rpc table, or not served by this api.
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    /// Rpc parameters could not be parsed.
    #[error("Invalid params for {method}: {reason}")]
    InvalidParams {
        /// Rpc method name.
        method: String,
        /// Parse failure.
        reason: String,
    },

    /// The node could not be reached, or failed at the transport level.
    #[error("Network error: {0}")]
    NetworkError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Error from the JsonRpcConnector that is not a transport failure.
    #[error("JsonRpcConnector error: {0}")]
    JsonRpcConnectorError(JsonRpcConnectorError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Node returned data that could not be translated.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<ChainClientError> for ApiError {
    fn from(value: ChainClientError) -> Self {
        match value {
            ChainClientError::NotFound(number) => ApiError::NotFound(number),
            ChainClientError::InvalidResponse(reason) => ApiError::InvalidResponse(reason),
            other => ApiError::NetworkError(Box::new(other)),
        }
    }
}

impl From<JsonRpcConnectorError> for ApiError {
    fn from(value: JsonRpcConnectorError) -> Self {
        if value.is_network() {
            ApiError::NetworkError(Box::new(value))
        } else {
            ApiError::JsonRpcConnectorError(value)
        }
    }
}

impl ApiError {
    /// Returns true if the error means "does not exist" rather than "unreachable".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_) | ApiError::MissingBlock(_))
    }
}

/// Errors related to the [`BlockFetchPipeline`](crate::pipeline::BlockFetchPipeline).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Range start above range end, no request was sent.
    #[error("Invalid range: start {start} > end {end}")]
    InvalidRange {
        /// Range start.
        start: u64,
        /// Range end.
        end: u64,
    },

    /// Fetching the block at `height` failed.
    #[error("Failed to fetch block {height}: {source}")]
    Block {
        /// Offending height.
        height: u64,
        /// Underlying api error.
        #[source]
        source: ApiError,
    },

    /// Fetching the events of block `hash` failed.
    #[error("Failed to fetch events of block {hash}: {source}")]
    Events {
        /// Offending block.
        hash: BlockHash,
        /// Underlying api error.
        #[source]
        source: ApiError,
    },

    /// A `timestamp.set` extrinsic carried a non numeric argument.
    #[error("Invalid timestamp in block {height}")]
    InvalidTimestamp {
        /// Offending height.
        height: u64,
    },
}

/// Errors related to the [`ApiService`](crate::service::ApiService).
#[derive(Debug, thiserror::Error)]
pub enum ApiServiceError {
    /// Node genesis does not match the configured one.
    #[error(
        "Network genesisHash doesn't match expected genesisHash. expected=\"{expected}\" actual=\"{actual}\""
    )]
    GenesisMismatch {
        /// Configured genesis hash.
        expected: String,
        /// Genesis hash reported by the node.
        actual: String,
    },

    /// Error from the chain api.
    #[error("Api error: {0}")]
    ApiError(#[from] ApiError),

    /// Error from the ChainClient.
    #[error("ChainClient error: {0}")]
    ChainClientError(#[from] ChainClientError),

    /// Error from the JsonRpcConnector.
    #[error("JsonRpcConnector error: {0}")]
    JsonRpcConnectorError(#[from] JsonRpcConnectorError),
}
