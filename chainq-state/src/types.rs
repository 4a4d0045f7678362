//! Generic, hash-addressed chain types served by every [`ChainApi`](crate::rpc::ChainApi).
//!
//! These mirror the shapes of the Substrate RPC surface so downstream indexing code can be
//! written once for native and adapted chain families.

use std::{fmt, str::FromStr};

use hex::FromHex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Block number along the canonical chain.
pub type BlockNumber = u64;

/// Opaque 32 byte block identifier, rendered as `0x` prefixed lowercase hex.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// The all zero hash, used as the parent of the first block.
    pub const ZERO: BlockHash = BlockHash([0; 32]);
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({self})")
    }
}

impl FromStr for BlockHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        <[u8; 32]>::from_hex(digits).map(BlockHash)
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Header digest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    /// Hex-encoded digest items.
    pub logs: Vec<String>,
}

/// A block header.
///
/// Always derived from a block on request, never cached on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Hash of this block.
    pub hash: BlockHash,
    /// Block number.
    pub number: BlockNumber,
    /// Hash of the parent block.
    pub parent_hash: BlockHash,
    /// Header digest.
    pub digest: Digest,
}

/// A call included in a block.
///
/// Native chains deliver extrinsics SCALE encoded; those are surfaced with `raw` set and empty
/// `section`/`method` as decoding them needs the runtime metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Extrinsic {
    /// Pallet name, eg. `balances`.
    pub section: String,
    /// Call name, eg. `transfer`.
    pub method: String,
    /// Decoded call arguments.
    pub args: Vec<Value>,
    /// Signer address for signed extrinsics.
    pub signer: Option<String>,
    /// Hex-encoded extrinsic bytes, if undecoded.
    pub raw: Option<String>,
}

impl Extrinsic {
    /// Returns a decoded extrinsic.
    pub fn call(section: impl Into<String>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Extrinsic {
            section: section.into(),
            method: method.into(),
            args,
            signer: None,
            raw: None,
        }
    }

    /// Returns an undecoded extrinsic.
    pub fn opaque(raw: impl Into<String>) -> Self {
        Extrinsic {
            raw: Some(raw.into()),
            ..Default::default()
        }
    }
}

/// Block body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block header.
    pub header: Header,
    /// Extrinsics in block order.
    pub extrinsics: Vec<Extrinsic>,
}

/// A block together with its finality justifications.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedBlock {
    /// The block.
    pub block: Block,
    /// Justifications, `None` for adapted chains.
    pub justifications: Option<Value>,
}

impl SignedBlock {
    /// Returns the block hash.
    pub fn hash(&self) -> BlockHash {
        self.block.header.hash
    }

    /// Returns the block number.
    pub fn number(&self) -> BlockNumber {
        self.block.header.number
    }
}

/// Phase of block execution an event was emitted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Emitted while applying the extrinsic at this index.
    ApplyExtrinsic(u32),
    /// Emitted during block finalization.
    Finalization,
    /// Emitted during block initialization.
    Initialization,
}

/// A runtime event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Pallet name.
    pub section: String,
    /// Event name.
    pub method: String,
    /// Event payload.
    pub data: Vec<Value>,
}

/// An event together with the phase it was emitted in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Execution phase.
    pub phase: Phase,
    /// The event.
    pub event: Event,
    /// Indexed topics.
    pub topics: Vec<BlockHash>,
}

/// Runtime version descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersion {
    /// Runtime identifier.
    pub spec_name: String,
    /// Implementation identifier.
    pub impl_name: String,
    /// Authoring version.
    pub authoring_version: u32,
    /// Spec version, bumped on every runtime upgrade.
    pub spec_version: u32,
    /// Implementation version.
    pub impl_version: u32,
    /// Transaction format version.
    pub transaction_version: u32,
    /// Supported runtime apis.
    pub apis: Vec<(String, u32)>,
}

/// Metadata of a single runtime module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Module name.
    pub name: String,
    /// Call names.
    pub calls: Vec<String>,
    /// Event names.
    pub events: Vec<String>,
}

/// Runtime metadata descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMetadata {
    /// Metadata magic number, `meta` in little endian.
    pub magic: u32,
    /// Metadata format version.
    pub version: u8,
    /// Decoded modules, empty when the metadata is not decoded.
    pub modules: Vec<ModuleMetadata>,
    /// Hex-encoded SCALE metadata, as delivered by native chains.
    pub raw: Option<String>,
}

impl RuntimeMetadata {
    /// `meta` read as a little endian u32.
    pub const MAGIC: u32 = 0x6174_656d;
}
