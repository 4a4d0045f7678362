//! Block-bound view of a [`ChainApi`].

use std::sync::Arc;

use serde_json::Value;

use crate::{
    error::ApiError,
    rpc::{ChainApi, RpcMethod},
    types::{BlockHash, EventRecord, Header, RuntimeVersion, SignedBlock},
};

/// A view of a [`ChainApi`] bound to one block.
///
/// Calls through [`PatchedApi::call`] have their historic block parameter replaced by the
/// bound hash, so mapping code always reads the state of the block being indexed.
#[derive(Clone)]
pub struct PatchedApi {
    api: Arc<dyn ChainApi>,
    hash: BlockHash,
    runtime_version: RuntimeVersion,
}

impl std::fmt::Debug for PatchedApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchedApi")
            .field("family", &self.api.family())
            .field("hash", &self.hash)
            .field("spec_version", &self.runtime_version.spec_version)
            .finish()
    }
}

impl PatchedApi {
    pub(crate) fn new(
        api: Arc<dyn ChainApi>,
        hash: BlockHash,
        runtime_version: RuntimeVersion,
    ) -> Self {
        PatchedApi {
            api,
            hash,
            runtime_version,
        }
    }

    /// Bound block hash.
    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    /// Runtime version the view was resolved with.
    pub fn runtime_version(&self) -> &RuntimeVersion {
        &self.runtime_version
    }

    /// Calls `method` with its historic parameter bound to this view's block.
    ///
    /// Fails [`ApiError::UnsupportedMethod`] for methods without a historic parameter.
    pub async fn call(&self, method: &str, mut params: Vec<Value>) -> Result<Value, ApiError> {
        let position = method
            .parse::<RpcMethod>()?
            .historic_param()
            .ok_or_else(|| ApiError::UnsupportedMethod(method.to_string()))?;

        if params.len() <= position {
            params.resize(position + 1, Value::Null);
        }
        params[position] = serde_json::to_value(self.hash)?;
        self.api.call(method, params).await
    }

    /// Header of the bound block.
    pub async fn header(&self) -> Result<Header, ApiError> {
        self.api.header(self.hash).await
    }

    /// The bound block.
    pub async fn block(&self) -> Result<SignedBlock, ApiError> {
        self.api.block(self.hash).await
    }

    /// Events of the bound block.
    pub async fn events(&self) -> Result<Vec<EventRecord>, ApiError> {
        self.api.events_at(self.hash).await
    }
}
