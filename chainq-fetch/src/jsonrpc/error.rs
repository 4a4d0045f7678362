//! Hold error types for the JsonRpcConnector and related functionality.

use crate::jsonrpc::connector::RpcError;

/// General error type for handling JsonRpcConnector errors.
#[derive(Debug, thiserror::Error)]
pub enum JsonRpcConnectorError {
    /// Type for errors without an underlying source.
    #[error("Error: {0}")]
    JsonRpcClientError(String),

    /// Error object returned by the node.
    #[error("Error: RPC error {}: {}", .0.code, .0.message)]
    RpcError(RpcError),

    /// Serialization/Deserialization Errors.
    #[error("Error: Serialization/Deserialization Error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Reqwest Based Errors.
    #[error("Error: HTTP Request Error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// URL Parse Errors.
    #[error("Error: Invalid URL:{0}")]
    UrlParseError(#[from] url::ParseError),
}

impl JsonRpcConnectorError {
    /// Constructor for errors without an underlying source
    pub fn new(msg: impl Into<String>) -> Self {
        JsonRpcConnectorError::JsonRpcClientError(msg.into())
    }

    /// Returns true if the error comes from the transport rather than the node.
    pub fn is_network(&self) -> bool {
        matches!(self, JsonRpcConnectorError::ReqwestError(e) if !e.is_decode())
    }
}
