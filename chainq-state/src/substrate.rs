//! Native hash-addressed api backed by a substrate node's JsonRPC service.

use async_trait::async_trait;
use chainq_fetch::jsonrpc::{
    connector::JsonRpcConnector,
    response::{HeaderResponse, RuntimeVersionResponse, SignedBlockResponse},
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    config::ChainFamily,
    error::ApiError,
    rpc::{ChainApi, RpcMethod},
    status::{ConnectionState, ConnectionStatus},
    types::{
        Block, BlockHash, BlockNumber, Digest, EventRecord, Extrinsic, Header, RuntimeMetadata,
        RuntimeVersion, SignedBlock,
    },
};

/// Chain api served by a substrate node.
///
/// The node has native block hashes, so no registry is kept. Extrinsics are returned
/// undecoded and events are not served, both need the runtime metadata to decode.
#[derive(Debug, Clone)]
pub struct SubstrateApi {
    connector: JsonRpcConnector,
    status: ConnectionStatus,
}

impl SubstrateApi {
    /// Returns a new, disconnected api.
    pub fn new(connector: JsonRpcConnector) -> Self {
        SubstrateApi {
            connector,
            status: ConnectionStatus::new(),
        }
    }

    /// Returns the underlying connector.
    pub fn connector(&self) -> &JsonRpcConnector {
        &self.connector
    }
}

fn parse_hash(method: RpcMethod, hash: &str) -> Result<BlockHash, ApiError> {
    hash.parse().map_err(|e| {
        ApiError::InvalidResponse(format!("{}: invalid block hash {hash}: {e}", method.name()))
    })
}

fn into_header(hash: BlockHash, header: HeaderResponse) -> Result<Header, ApiError> {
    let number = header.block_number().map_err(|e| {
        ApiError::InvalidResponse(format!("invalid block number {}: {e}", header.number))
    })?;
    Ok(Header {
        hash,
        number,
        parent_hash: parse_hash(RpcMethod::Header, &header.parent_hash)?,
        digest: Digest {
            logs: header.digest.logs,
        },
    })
}

fn into_signed_block(hash: BlockHash, block: SignedBlockResponse) -> Result<SignedBlock, ApiError> {
    Ok(SignedBlock {
        block: Block {
            header: into_header(hash, block.block.header)?,
            extrinsics: block
                .block
                .extrinsics
                .into_iter()
                .map(Extrinsic::opaque)
                .collect(),
        },
        justifications: block.justifications,
    })
}

impl From<RuntimeVersionResponse> for RuntimeVersion {
    fn from(version: RuntimeVersionResponse) -> Self {
        RuntimeVersion {
            spec_name: version.spec_name,
            impl_name: version.impl_name,
            authoring_version: version.authoring_version,
            spec_version: version.spec_version,
            impl_version: version.impl_version,
            transaction_version: version.transaction_version,
            apis: version.apis,
        }
    }
}

/// Reads the magic number and format version from hex-encoded SCALE metadata.
fn parse_metadata(raw: String) -> Result<RuntimeMetadata, ApiError> {
    let bytes = hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| ApiError::InvalidResponse(format!("invalid metadata hex: {e}")))?;
    if bytes.len() < 5 {
        return Err(ApiError::InvalidResponse(format!(
            "metadata too short: {} bytes",
            bytes.len()
        )));
    }
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != RuntimeMetadata::MAGIC {
        return Err(ApiError::InvalidResponse(format!(
            "invalid metadata magic {magic:#x}"
        )));
    }
    Ok(RuntimeMetadata {
        magic,
        version: bytes[4],
        modules: Vec::new(),
        raw: Some(raw),
    })
}

#[async_trait]
impl ChainApi for SubstrateApi {
    fn family(&self) -> ChainFamily {
        ChainFamily::Substrate
    }

    fn connection_state(&self) -> ConnectionState {
        self.status.load()
    }

    fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    async fn connect(&self) -> Result<(), ApiError> {
        if self.status.load() == ConnectionState::Active {
            return Ok(());
        }
        self.status
            .transition(ConnectionState::Disconnected, ConnectionState::Connected)
            .map_err(|state| ApiError::NotConnected {
                method: "connect".to_string(),
                state,
            })?;

        match self.connector.system_chain().await {
            Ok(chain) => {
                self.status
                    .transition(ConnectionState::Connected, ConnectionState::Active)
                    .map_err(|state| ApiError::NotConnected {
                        method: "connect".to_string(),
                        state,
                    })?;
                info!(%chain, url = %self.connector.url(), "Connected to substrate node");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to reach substrate node: {e}");
                self.status.disconnect();
                Err(e.into())
            }
        }
    }

    async fn disconnect(&self) {
        self.status.disconnect();
    }

    fn supports(&self, method: RpcMethod) -> bool {
        !matches!(method, RpcMethod::EventsAt | RpcMethod::EventsRange)
    }

    async fn runtime_version(&self, at: Option<BlockHash>) -> Result<RuntimeVersion, ApiError> {
        self.status.ensure_active(RpcMethod::RuntimeVersion.name())?;
        let at = at.map(|hash| hash.to_string());
        Ok(self
            .connector
            .get_runtime_version(at.as_deref())
            .await?
            .into())
    }

    async fn metadata(&self, at: Option<BlockHash>) -> Result<RuntimeMetadata, ApiError> {
        self.status.ensure_active(RpcMethod::Metadata.name())?;
        let at = at.map(|hash| hash.to_string());
        parse_metadata(self.connector.get_metadata(at.as_deref()).await?)
    }

    async fn chain_name(&self) -> Result<String, ApiError> {
        self.status.ensure_active(RpcMethod::ChainName.name())?;
        Ok(self.connector.system_chain().await?)
    }

    async fn genesis_hash(&self) -> Result<String, ApiError> {
        self.status.ensure_active(RpcMethod::GenesisHash.name())?;
        self.connector
            .get_block_hash(0)
            .await?
            .ok_or(ApiError::NotFound(0))
    }

    async fn block_hash(&self, number: BlockNumber) -> Result<BlockHash, ApiError> {
        self.status.ensure_active(RpcMethod::BlockHash.name())?;
        let hash = self
            .connector
            .get_block_hash(number)
            .await?
            .ok_or(ApiError::NotFound(number))?;
        parse_hash(RpcMethod::BlockHash, &hash)
    }

    async fn finalized_head(&self) -> Result<BlockHash, ApiError> {
        self.status.ensure_active(RpcMethod::FinalizedHead.name())?;
        let hash = self.connector.get_finalized_head().await?;
        parse_hash(RpcMethod::FinalizedHead, &hash)
    }

    async fn header(&self, hash: BlockHash) -> Result<Header, ApiError> {
        self.status.ensure_active(RpcMethod::Header.name())?;
        let header = self
            .connector
            .get_header(&hash.to_string())
            .await?
            .ok_or(ApiError::MissingBlock(hash))?;
        into_header(hash, header)
    }

    async fn block(&self, hash: BlockHash) -> Result<SignedBlock, ApiError> {
        self.status.ensure_active(RpcMethod::Block.name())?;
        let block = self
            .connector
            .get_block(&hash.to_string())
            .await?
            .ok_or(ApiError::MissingBlock(hash))?;
        into_signed_block(hash, block)
    }

    async fn events_at(&self, _hash: BlockHash) -> Result<Vec<EventRecord>, ApiError> {
        Err(ApiError::UnsupportedMethod(RpcMethod::EventsAt.name().to_string()))
    }

    async fn events_range(
        &self,
        _from: BlockHash,
        _to: BlockHash,
    ) -> Result<Vec<EventRecord>, ApiError> {
        Err(ApiError::UnsupportedMethod(RpcMethod::EventsRange.name().to_string()))
    }
}
