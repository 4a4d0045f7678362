//! Response types for the algod REST client.

/// Response to a `GET /v2/status` request.
///
/// This is used for the output parameter of [`AlgodConnector::get_status`](crate::algod::connector::AlgodConnector::get_status).
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NodeStatusResponse {
    /// The last round seen by the node.
    #[serde(rename = "last-round")]
    pub last_round: u64,

    /// The consensus version of the last round.
    #[serde(rename = "last-version", default)]
    pub last_version: String,

    /// Nanoseconds since the last round was seen.
    #[serde(rename = "time-since-last-round", default)]
    pub time_since_last_round: u64,

    /// Nanoseconds the node has spent in fast catchup, zero if not catching up.
    #[serde(rename = "catchup-time", default)]
    pub catchup_time: u64,
}

/// Response to a `GET /v2/blocks/{round}?format=json` request.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BlockResponse {
    /// The requested block.
    pub block: AlgodBlock,
}

/// A block as returned by algod.
///
/// algod omits zero valued fields from its encoding, so every field but the genesis hash
/// falls back to its default when missing (round 0 is serialized without `rnd`).
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AlgodBlock {
    /// Round number of this block.
    #[serde(rename = "rnd", default)]
    pub round: u64,

    /// Native hash of the previous block, empty for the genesis block.
    #[serde(default)]
    pub prev: String,

    /// Base64 encoded hash of the genesis block of this network.
    #[serde(rename = "gh")]
    pub genesis_hash: String,

    /// Human readable network identifier, eg. `mainnet-v1.0`.
    #[serde(rename = "gen", default)]
    pub genesis_id: String,

    /// Block timestamp, seconds since the unix epoch.
    #[serde(rename = "ts", default)]
    pub timestamp: i64,

    /// Sortition seed.
    #[serde(default)]
    pub seed: String,

    /// Root of the transaction merkle tree.
    #[serde(rename = "txn", default)]
    pub txn_root: String,

    /// Consensus protocol version.
    #[serde(rename = "proto", default)]
    pub protocol: String,

    /// Transactions included in the block, kept in their node encoding.
    #[serde(rename = "txns", default)]
    pub transactions: Vec<serde_json::Value>,
}
