//! Protocol adapter serving a round-addressed algod client through the hash-addressed
//! [`ChainApi`] surface.
//!
//! Algorand has no block hash the generic surface could use, so one is derived from the
//! genesis hash and round (see [`derive_block_hash`]) and remembered in a [`HashRegistry`]
//! long enough to satisfy a `finalizedHead -> header -> block` call chain.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chainq_fetch::{algod::response::AlgodBlock, chain::client::ChainClient};
use sha2::{Digest as _, Sha256};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    config::ChainFamily,
    error::ApiError,
    registry::{HashRegistry, Slot},
    rpc::{ChainApi, RpcMethod},
    status::{ConnectionState, ConnectionStatus},
    types::{
        Block, BlockHash, BlockNumber, Digest, EventRecord, Header, RuntimeMetadata,
        RuntimeVersion, SignedBlock,
    },
};

/// Chain name reported by the adapter.
pub const ALGORAND_CHAIN: &str = "algorand";

/// Spec name reported by the adapter.
pub const ALGORAND_SPEC_NAME: &str = "mainnet-1.0";

/// Spec version reported by the adapter, adapted chains model no runtime upgrades.
pub const ALGORAND_SPEC_VERSION: u32 = 1;

/// Metadata format version reported by the adapter.
pub const ALGORAND_METADATA_VERSION: u8 = 14;

/// Derives the hash of block `number` from the base64 genesis hash of its network.
///
/// `sha256(genesis_bytes || number as u64 big endian)`. A genesis hash that is not valid
/// base64 contributes its utf-8 bytes.
pub fn derive_block_hash(genesis_hash: &str, number: BlockNumber) -> BlockHash {
    let genesis = STANDARD
        .decode(genesis_hash)
        .unwrap_or_else(|_| genesis_hash.as_bytes().to_vec());
    let mut hasher = Sha256::new();
    hasher.update(&genesis);
    hasher.update(number.to_be_bytes());
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    BlockHash(hash)
}

/// Derives the header of an algod block.
pub fn algod_header(block: &AlgodBlock) -> Header {
    let parent_hash = match block.round {
        0 => BlockHash::ZERO,
        round => derive_block_hash(&block.genesis_hash, round - 1),
    };
    Header {
        hash: derive_block_hash(&block.genesis_hash, block.round),
        number: block.round,
        parent_hash,
        digest: Digest::default(),
    }
}

/// Translates an algod block into a generic block.
///
/// The adapted chain contributes no transaction detail, extrinsics are always empty.
pub fn algod_signed_block(block: &AlgodBlock) -> SignedBlock {
    SignedBlock {
        block: Block {
            header: algod_header(block),
            extrinsics: Vec::new(),
        },
        justifications: None,
    }
}

/// Hash-addressed api over an algod client.
#[derive(Debug)]
pub struct AlgorandAdapter<C> {
    client: C,
    registry: HashRegistry<AlgodBlock>,
    status: ConnectionStatus,
}

impl<C: ChainClient<Block = AlgodBlock>> AlgorandAdapter<C> {
    /// Returns a new, disconnected adapter.
    pub fn new(client: C) -> Self {
        AlgorandAdapter {
            client,
            registry: HashRegistry::new(),
            status: ConnectionStatus::new(),
        }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the hash registry owned by the adapter.
    pub fn registry(&self) -> &HashRegistry<AlgodBlock> {
        &self.registry
    }

    async fn fetch(&self, number: BlockNumber) -> Result<(BlockHash, AlgodBlock), ApiError> {
        let block = self.client.block_by_number(number).await?;
        if block.round != number {
            return Err(ApiError::InvalidResponse(format!(
                "requested round {number}, node returned round {}",
                block.round
            )));
        }
        Ok((derive_block_hash(&block.genesis_hash, number), block))
    }
}

#[async_trait]
impl<C: ChainClient<Block = AlgodBlock>> ChainApi for AlgorandAdapter<C> {
    fn family(&self) -> ChainFamily {
        ChainFamily::Algorand
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

        match self.client.status().await {
            Ok(status) => {
                self.status
                    .transition(ConnectionState::Connected, ConnectionState::Active)
                    .map_err(|state| ApiError::NotConnected {
                        method: "connect".to_string(),
                        state,
                    })?;
                info!(last_round = status.last_height, "Connected to algod node");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to reach algod node: {e}");
                self.status.disconnect();
                Err(e.into())
            }
        }
    }

    async fn disconnect(&self) {
        self.status.disconnect();
    }

    async fn runtime_version(&self, _at: Option<BlockHash>) -> Result<RuntimeVersion, ApiError> {
        self.status.ensure_active(RpcMethod::RuntimeVersion.name())?;
        Ok(RuntimeVersion {
            spec_name: ALGORAND_SPEC_NAME.to_string(),
            impl_name: ALGORAND_CHAIN.to_string(),
            authoring_version: 0,
            spec_version: ALGORAND_SPEC_VERSION,
            impl_version: 0,
            transaction_version: 0,
            apis: Vec::new(),
        })
    }

    async fn metadata(&self, _at: Option<BlockHash>) -> Result<RuntimeMetadata, ApiError> {
        self.status.ensure_active(RpcMethod::Metadata.name())?;
        Ok(RuntimeMetadata {
            magic: RuntimeMetadata::MAGIC,
            version: ALGORAND_METADATA_VERSION,
            modules: Vec::new(),
            raw: None,
        })
    }

    async fn chain_name(&self) -> Result<String, ApiError> {
        self.status.ensure_active(RpcMethod::ChainName.name())?;
        Ok(ALGORAND_CHAIN.to_string())
    }

    /// The `prev` field of round 1 identifies the network.
    async fn genesis_hash(&self) -> Result<String, ApiError> {
        self.status.ensure_active(RpcMethod::GenesisHash.name())?;
        Ok(self.client.block_by_number(1).await?.prev)
    }

    async fn block_hash(&self, number: BlockNumber) -> Result<BlockHash, ApiError> {
        self.status.ensure_active(RpcMethod::BlockHash.name())?;
        if let Some(hash) = self.registry.lookup_or_revive(number).await {
            return Ok(hash);
        }

        let (hash, block) = self.fetch(number).await?;
        self.registry.put(hash, number, block).await;
        debug!(number, %hash, "registered block");
        Ok(hash)
    }

    async fn finalized_head(&self) -> Result<BlockHash, ApiError> {
        self.status.ensure_active(RpcMethod::FinalizedHead.name())?;
        let number = self.client.status().await?.last_height;

        if let Some(hash) = self.registry.pin_number(number).await {
            return Ok(hash);
        }
        let (hash, block) = self.fetch(number).await?;
        self.registry.put_pinned(hash, number, block).await?;
        Ok(hash)
    }

    async fn header(&self, hash: BlockHash) -> Result<Header, ApiError> {
        self.status.ensure_active(RpcMethod::Header.name())?;
        let (_, block) = self.registry.get(&hash).await?;
        Ok(algod_header(&block))
    }

    async fn block(&self, hash: BlockHash) -> Result<SignedBlock, ApiError> {
        self.status.ensure_active(RpcMethod::Block.name())?;
        let (_, block, slot) = self
            .registry
            .entry(&hash)
            .await
            .ok_or(ApiError::MissingBlock(hash))?;

        match slot {
            Slot::Retired => Err(ApiError::MissingBlock(hash)),
            Slot::Pinned => Ok(algod_signed_block(&block)),
            Slot::Transient => {
                self.registry.evict_transient(&hash).await;
                Ok(algod_signed_block(&block))
            }
        }
    }

    async fn events_at(&self, _hash: BlockHash) -> Result<Vec<EventRecord>, ApiError> {
        self.status.ensure_active(RpcMethod::EventsAt.name())?;
        Ok(Vec::new())
    }

    async fn events_range(
        &self,
        _from: BlockHash,
        _to: BlockHash,
    ) -> Result<Vec<EventRecord>, ApiError> {
        self.status.ensure_active(RpcMethod::EventsRange.name())?;
        Ok(Vec::new())
    }

    /// Fetches by round without going through the registry.
    async fn block_by_number(&self, number: BlockNumber) -> Result<SignedBlock, ApiError> {
        self.status.ensure_active(RpcMethod::Block.name())?;
        let (_, block) = self.fetch(number).await?;
        Ok(algod_signed_block(&block))
    }
}
