//! Response types for jsonRPC client.

/// Header digest as returned by `chain_getHeader`.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DigestResponse {
    /// SCALE encoded digest items, hex-encoded.
    #[serde(default)]
    pub logs: Vec<String>,
}

/// Response to a `chain_getHeader` RPC request.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderResponse {
    /// Hex-encoded hash of the parent block.
    pub parent_hash: String,

    /// Hex-encoded block number, eg. `0x1a2b`.
    pub number: String,

    /// Hex-encoded state trie root.
    #[serde(default)]
    pub state_root: String,

    /// Hex-encoded extrinsics trie root.
    #[serde(default)]
    pub extrinsics_root: String,

    /// Header digest.
    #[serde(default)]
    pub digest: DigestResponse,
}

impl HeaderResponse {
    /// Parses the hex-encoded block number.
    pub fn block_number(&self) -> Result<u64, std::num::ParseIntError> {
        u64::from_str_radix(self.number.trim_start_matches("0x"), 16)
    }
}

/// Block body as returned inside a `chain_getBlock` response.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BlockResponse {
    /// Block header.
    pub header: HeaderResponse,

    /// Hex-encoded opaque extrinsics.
    #[serde(default)]
    pub extrinsics: Vec<String>,
}

/// Response to a `chain_getBlock` RPC request.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SignedBlockResponse {
    /// The block.
    pub block: BlockResponse,

    /// Finality justifications, if the node holds any.
    #[serde(default)]
    pub justifications: Option<serde_json::Value>,
}

/// Response to a `state_getRuntimeVersion` RPC request.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersionResponse {
    /// Runtime identifier, eg. `polkadot`.
    pub spec_name: String,

    /// Implementation identifier.
    pub impl_name: String,

    /// Authoring version.
    #[serde(default)]
    pub authoring_version: u32,

    /// Runtime spec version.
    pub spec_version: u32,

    /// Implementation version.
    #[serde(default)]
    pub impl_version: u32,

    /// Transaction format version.
    #[serde(default)]
    pub transaction_version: u32,

    /// Supported runtime apis as `(api id, version)` pairs.
    #[serde(default)]
    pub apis: Vec<(String, u32)>,
}
