//! Holds the ChainClient trait implemented by round-addressed connectors.

use std::sync::Arc;

use async_trait::async_trait;

use crate::chain::error::ChainClientError;

/// Chain tip information reported by a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainStatus {
    /// Highest height the node currently knows about.
    pub last_height: u64,
}

/// Thin transport wrapper around a chain-native SDK.
///
/// Implementors issue number (round) indexed requests and return the raw node responses.
/// No retry logic lives here, a failed request is reported to the caller as is.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Raw block type returned by the node.
    type Block: Clone + PartialEq + Send + Sync + 'static;

    /// Returns the current chain tip.
    async fn status(&self) -> Result<ChainStatus, ChainClientError>;

    /// Returns the block at `height`.
    ///
    /// Fails with [`ChainClientError::NotFound`] if `height` is above the last known height.
    async fn block_by_number(&self, height: u64) -> Result<Self::Block, ChainClientError>;
}

#[async_trait]
impl<C: ChainClient> ChainClient for Arc<C> {
    type Block = C::Block;

    async fn status(&self) -> Result<ChainStatus, ChainClientError> {
        self.as_ref().status().await
    }

    async fn block_by_number(&self, height: u64) -> Result<Self::Block, ChainClientError> {
        self.as_ref().block_by_number(height).await
    }
}
