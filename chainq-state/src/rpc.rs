//! Generic hash-addressed rpc surface.
//!
//! Every chain family is served through the closed [`RpcMethod`] table. Requests are parsed
//! once into a typed [`RpcRequest`] and dispatched to the matching [`ChainApi`] operation.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::{
    config::ChainFamily,
    error::ApiError,
    status::ConnectionState,
    types::{
        BlockHash, BlockNumber, EventRecord, Header, RuntimeMetadata, RuntimeVersion, SignedBlock,
    },
};

/// Operations served by a [`ChainApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    /// `state_getRuntimeVersion`
    RuntimeVersion,
    /// `state_getMetadata`
    Metadata,
    /// `system_chain`
    ChainName,
    /// `chain_getGenesisHash`
    GenesisHash,
    /// `chain_getBlockHash`
    BlockHash,
    /// `chain_getFinalizedHead`
    FinalizedHead,
    /// `chain_getHeader`
    Header,
    /// `chain_getBlock`
    Block,
    /// `state_getEvents`
    EventsAt,
    /// `state_queryEvents`
    EventsRange,
}

impl RpcMethod {
    /// Every method in the table.
    pub const ALL: [RpcMethod; 10] = [
        RpcMethod::RuntimeVersion,
        RpcMethod::Metadata,
        RpcMethod::ChainName,
        RpcMethod::GenesisHash,
        RpcMethod::BlockHash,
        RpcMethod::FinalizedHead,
        RpcMethod::Header,
        RpcMethod::Block,
        RpcMethod::EventsAt,
        RpcMethod::EventsRange,
    ];

    /// Returns the rpc name of the method.
    pub fn name(self) -> &'static str {
        match self {
            RpcMethod::RuntimeVersion => "state_getRuntimeVersion",
            RpcMethod::Metadata => "state_getMetadata",
            RpcMethod::ChainName => "system_chain",
            RpcMethod::GenesisHash => "chain_getGenesisHash",
            RpcMethod::BlockHash => "chain_getBlockHash",
            RpcMethod::FinalizedHead => "chain_getFinalizedHead",
            RpcMethod::Header => "chain_getHeader",
            RpcMethod::Block => "chain_getBlock",
            RpcMethod::EventsAt => "state_getEvents",
            RpcMethod::EventsRange => "state_queryEvents",
        }
    }

    /// Position of the block hash parameter that selects historic state, if any.
    pub fn historic_param(self) -> Option<usize> {
        match self {
            RpcMethod::RuntimeVersion
            | RpcMethod::Metadata
            | RpcMethod::Header
            | RpcMethod::Block
            | RpcMethod::EventsAt => Some(0),
            _ => None,
        }
    }
}

impl FromStr for RpcMethod {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RpcMethod::ALL
            .into_iter()
            .find(|method| method.name() == s)
            .ok_or_else(|| ApiError::UnsupportedMethod(s.to_string()))
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed rpc request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcRequest {
    /// Runtime version at a block, or at the head.
    RuntimeVersion(Option<BlockHash>),
    /// Runtime metadata at a block, or at the head.
    Metadata(Option<BlockHash>),
    /// Chain name.
    ChainName,
    /// Genesis identity.
    GenesisHash,
    /// Hash of the block at a number.
    BlockHash(BlockNumber),
    /// Finalized head.
    FinalizedHead,
    /// Header of a block.
    Header(BlockHash),
    /// Block by hash.
    Block(BlockHash),
    /// Events of a block.
    EventsAt(BlockHash),
    /// Events of an inclusive block range.
    EventsRange {
        /// First block.
        from: BlockHash,
        /// Last block.
        to: BlockHash,
    },
}

impl RpcRequest {
    /// Parses a request from a method name and positional json params.
    pub fn parse(method: &str, params: Vec<Value>) -> Result<Self, ApiError> {
        let rpc_method: RpcMethod = method.parse()?;
        let params = Params {
            method: rpc_method,
            params,
        };
        Ok(match rpc_method {
            RpcMethod::RuntimeVersion => RpcRequest::RuntimeVersion(params.optional(0)?),
            RpcMethod::Metadata => RpcRequest::Metadata(params.optional(0)?),
            RpcMethod::ChainName => RpcRequest::ChainName,
            RpcMethod::GenesisHash => RpcRequest::GenesisHash,
            RpcMethod::BlockHash => RpcRequest::BlockHash(params.required(0)?),
            RpcMethod::FinalizedHead => RpcRequest::FinalizedHead,
            RpcMethod::Header => RpcRequest::Header(params.required(0)?),
            RpcMethod::Block => RpcRequest::Block(params.required(0)?),
            RpcMethod::EventsAt => RpcRequest::EventsAt(params.required(0)?),
            RpcMethod::EventsRange => RpcRequest::EventsRange {
                from: params.required(0)?,
                to: params.required(1)?,
            },
        })
    }

    /// Returns the method of the request.
    pub fn method(&self) -> RpcMethod {
        match self {
            RpcRequest::RuntimeVersion(_) => RpcMethod::RuntimeVersion,
            RpcRequest::Metadata(_) => RpcMethod::Metadata,
            RpcRequest::ChainName => RpcMethod::ChainName,
            RpcRequest::GenesisHash => RpcMethod::GenesisHash,
            RpcRequest::BlockHash(_) => RpcMethod::BlockHash,
            RpcRequest::FinalizedHead => RpcMethod::FinalizedHead,
            RpcRequest::Header(_) => RpcMethod::Header,
            RpcRequest::Block(_) => RpcMethod::Block,
            RpcRequest::EventsAt(_) => RpcMethod::EventsAt,
            RpcRequest::EventsRange { .. } => RpcMethod::EventsRange,
        }
    }
}

struct Params {
    method: RpcMethod,
    params: Vec<Value>,
}

impl Params {
    fn invalid(&self, reason: impl Into<String>) -> ApiError {
        ApiError::InvalidParams {
            method: self.method.name().to_string(),
            reason: reason.into(),
        }
    }

    fn optional<T: DeserializeOwned>(&self, position: usize) -> Result<Option<T>, ApiError> {
        match self.params.get(position) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| self.invalid(format!("param {position}: {e}"))),
        }
    }

    fn required<T: DeserializeOwned>(&self, position: usize) -> Result<T, ApiError> {
        self.optional(position)?
            .ok_or_else(|| self.invalid(format!("missing param {position}")))
    }
}

/// A typed rpc response.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    /// Runtime version.
    RuntimeVersion(RuntimeVersion),
    /// Runtime metadata.
    Metadata(RuntimeMetadata),
    /// Chain name.
    ChainName(String),
    /// Genesis identity.
    GenesisHash(String),
    /// A block hash.
    BlockHash(BlockHash),
    /// Block header.
    Header(Header),
    /// Block.
    Block(SignedBlock),
    /// Ordered events.
    Events(Vec<EventRecord>),
}

impl RpcResponse {
    /// Converts the response into its json representation.
    pub fn into_json(self) -> Result<Value, serde_json::Error> {
        match self {
            RpcResponse::RuntimeVersion(version) => serde_json::to_value(version),
            RpcResponse::Metadata(metadata) => serde_json::to_value(metadata),
            RpcResponse::ChainName(name) | RpcResponse::GenesisHash(name) => Ok(Value::String(name)),
            RpcResponse::BlockHash(hash) => serde_json::to_value(hash),
            RpcResponse::Header(header) => serde_json::to_value(header),
            RpcResponse::Block(block) => serde_json::to_value(block),
            RpcResponse::Events(events) => serde_json::to_value(events),
        }
    }
}

/// Hash-addressed chain api.
///
/// Implemented natively by hash-addressed chains and through a protocol adapter by
/// round-addressed ones. Every operation except [`ChainApi::connect`] fails
/// [`ApiError::NotConnected`] unless the api is active.
#[async_trait]
pub trait ChainApi: Send + Sync + 'static {
    /// Chain family served.
    fn family(&self) -> ChainFamily;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Returns a receiver notified on connection state changes.
    fn subscribe_connection(&self) -> watch::Receiver<ConnectionState>;

    /// Connects to the node and checks it answers, the api is active on success.
    async fn connect(&self) -> Result<(), ApiError>;

    /// Disconnects from the node.
    async fn disconnect(&self);

    /// Returns false for table methods this api does not serve.
    fn supports(&self, method: RpcMethod) -> bool {
        let _ = method;
        true
    }

    /// Runtime version at `at`, or at the head.
    async fn runtime_version(&self, at: Option<BlockHash>) -> Result<RuntimeVersion, ApiError>;

    /// Runtime metadata at `at`, or at the head.
    async fn metadata(&self, at: Option<BlockHash>) -> Result<RuntimeMetadata, ApiError>;

    /// Chain name.
    async fn chain_name(&self) -> Result<String, ApiError>;

    /// Identity of the first block, compared against configuration on startup.
    async fn genesis_hash(&self) -> Result<String, ApiError>;

    /// Hash of the block at `number`.
    async fn block_hash(&self, number: BlockNumber) -> Result<BlockHash, ApiError>;

    /// Hash of the last finalized block.
    async fn finalized_head(&self) -> Result<BlockHash, ApiError>;

    /// Header of the block with `hash`.
    async fn header(&self, hash: BlockHash) -> Result<Header, ApiError>;

    /// Block with `hash`.
    async fn block(&self, hash: BlockHash) -> Result<SignedBlock, ApiError>;

    /// Events emitted in the block with `hash`, in emission order.
    async fn events_at(&self, hash: BlockHash) -> Result<Vec<EventRecord>, ApiError>;

    /// Events emitted in the blocks `from..=to`, in emission order.
    async fn events_range(
        &self,
        from: BlockHash,
        to: BlockHash,
    ) -> Result<Vec<EventRecord>, ApiError>;

    /// Block at `number`.
    async fn block_by_number(&self, number: BlockNumber) -> Result<SignedBlock, ApiError> {
        let hash = self.block_hash(number).await?;
        self.block(hash).await
    }

    /// Dispatches a typed request to its operation.
    async fn dispatch(&self, request: RpcRequest) -> Result<RpcResponse, ApiError> {
        let method = request.method();
        if !self.supports(method) {
            return Err(ApiError::UnsupportedMethod(method.name().to_string()));
        }
        Ok(match request {
            RpcRequest::RuntimeVersion(at) => {
                RpcResponse::RuntimeVersion(self.runtime_version(at).await?)
            }
            RpcRequest::Metadata(at) => RpcResponse::Metadata(self.metadata(at).await?),
            RpcRequest::ChainName => RpcResponse::ChainName(self.chain_name().await?),
            RpcRequest::GenesisHash => RpcResponse::GenesisHash(self.genesis_hash().await?),
            RpcRequest::BlockHash(number) => {
                RpcResponse::BlockHash(self.block_hash(number).await?)
            }
            RpcRequest::FinalizedHead => RpcResponse::BlockHash(self.finalized_head().await?),
            RpcRequest::Header(hash) => RpcResponse::Header(self.header(hash).await?),
            RpcRequest::Block(hash) => RpcResponse::Block(self.block(hash).await?),
            RpcRequest::EventsAt(hash) => RpcResponse::Events(self.events_at(hash).await?),
            RpcRequest::EventsRange { from, to } => {
                RpcResponse::Events(self.events_range(from, to).await?)
            }
        })
    }

    /// Calls a method by rpc name with positional json params.
    ///
    /// Unknown names fail [`ApiError::UnsupportedMethod`].
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ApiError> {
        let request = RpcRequest::parse(method, params)?;
        Ok(self.dispatch(request).await?.into_json()?)
    }
}
