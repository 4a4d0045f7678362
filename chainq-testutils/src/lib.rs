//! Chainq Testing Utilities.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chainq_fetch::{
    algod::response::AlgodBlock,
    chain::{
        client::{ChainClient, ChainStatus},
        error::ChainClientError,
    },
};
use serde_json::json;

/// Genesis hash of the algorand testnet.
pub const TESTNET_GENESIS_HASH: &str = "SGO1GKSzyE7IEPItTxCByw9x8FmnrCDexi9/cOUJOiI=";

/// Genesis id of the algorand testnet.
pub const TESTNET_GENESIS_ID: &str = "testnet-v1.0";

/// Failure injected for a round of a [`MockAlgod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Fail with a transport error.
    Network,
    /// Fail as if the round did not exist.
    NotFound,
}

/// Returns the mock `prev` field of `round`, empty for the genesis block.
pub fn mock_prev(round: u64) -> String {
    match round {
        0 => String::new(),
        round => format!("blk-MOCK{:048}", round - 1),
    }
}

/// Builds an algod block for `round` on the network with `genesis_hash`.
pub fn algod_block(round: u64, genesis_hash: &str) -> AlgodBlock {
    AlgodBlock {
        round,
        prev: mock_prev(round),
        genesis_hash: genesis_hash.to_string(),
        genesis_id: TESTNET_GENESIS_ID.to_string(),
        timestamp: 1_600_000_000 + round as i64 * 4,
        seed: format!("seed-{round}"),
        txn_root: String::new(),
        protocol: "https://github.com/algorandfoundation/specs/tree/abc54f7".to_string(),
        transactions: Vec::new(),
    }
}

/// Returns the json body algod serves for `GET /v2/blocks/{round}?format=json`.
pub fn algod_block_json(round: u64, genesis_hash: &str) -> serde_json::Value {
    let block = algod_block(round, genesis_hash);
    json!({
        "block": {
            "rnd": block.round,
            "prev": block.prev,
            "gh": block.genesis_hash,
            "gen": block.genesis_id,
            "ts": block.timestamp,
            "seed": block.seed,
            "proto": block.protocol,
        }
    })
}

/// Returns the json body algod serves for `GET /v2/status`.
pub fn algod_status_json(last_round: u64) -> serde_json::Value {
    json!({
        "last-round": last_round,
        "last-version": "https://github.com/algorandfoundation/specs/tree/abc54f7",
        "time-since-last-round": 1_250_000_000u64,
        "catchup-time": 0,
    })
}

/// In-memory algod client.
///
/// Serves rounds `0..=last_round` built with [`algod_block`], with per-round failure
/// injection and request counters.
#[derive(Debug)]
pub struct MockAlgod {
    genesis_hash: String,
    first_prev: Option<String>,
    last_round: AtomicU64,
    shuffled_latency: bool,
    failing_status: AtomicBool,
    failures: Mutex<HashMap<u64, MockFailure>>,
    fetches: Mutex<HashMap<u64, usize>>,
}

impl MockAlgod {
    /// Returns a testnet mock with `last_round` as chain tip.
    pub fn new(last_round: u64) -> Self {
        MockAlgod {
            genesis_hash: TESTNET_GENESIS_HASH.to_string(),
            first_prev: None,
            last_round: AtomicU64::new(last_round),
            shuffled_latency: false,
            failing_status: AtomicBool::new(false),
            failures: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    /// Serves blocks of the network with `genesis_hash`.
    pub fn with_genesis_hash(mut self, genesis_hash: impl Into<String>) -> Self {
        self.genesis_hash = genesis_hash.into();
        self
    }

    /// Sets the `prev` field of round 1, the network identity checked on startup.
    pub fn with_first_prev(mut self, prev: impl Into<String>) -> Self {
        self.first_prev = Some(prev.into());
        self
    }

    /// Delays every block request so that higher rounds complete first.
    pub fn with_shuffled_latency(mut self) -> Self {
        self.shuffled_latency = true;
        self
    }

    /// Moves the chain tip.
    pub fn set_last_round(&self, last_round: u64) {
        self.last_round.store(last_round, Ordering::SeqCst);
    }

    /// Makes every request for `round` fail.
    pub fn fail_round(&self, round: u64, failure: MockFailure) {
        self.failures.lock().unwrap().insert(round, failure);
    }

    /// Makes status requests fail while `failing` is set.
    pub fn fail_status(&self, failing: bool) {
        self.failing_status.store(failing, Ordering::SeqCst);
    }

    /// Number of block requests received for `round`.
    pub fn fetch_count(&self, round: u64) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(&round)
            .copied()
            .unwrap_or_default()
    }

    /// Number of block requests received.
    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }

    /// The `prev` field served for `round`.
    pub fn prev_of(&self, round: u64) -> String {
        match (round, &self.first_prev) {
            (1, Some(prev)) => prev.clone(),
            _ => mock_prev(round),
        }
    }
}

#[async_trait]
impl ChainClient for MockAlgod {
    type Block = AlgodBlock;

    async fn status(&self) -> Result<ChainStatus, ChainClientError> {
        if self.failing_status.load(Ordering::SeqCst) {
            return Err(ChainClientError::network("mock algod status unavailable"));
        }
        Ok(ChainStatus {
            last_height: self.last_round.load(Ordering::SeqCst),
        })
    }

    async fn block_by_number(&self, height: u64) -> Result<AlgodBlock, ChainClientError> {
        *self.fetches.lock().unwrap().entry(height).or_default() += 1;
        let last_round = self.last_round.load(Ordering::SeqCst);

        if self.shuffled_latency {
            let delay = last_round.saturating_sub(height).min(25);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let failure = self.failures.lock().unwrap().get(&height).copied();
        match failure {
            Some(MockFailure::Network) => Err(ChainClientError::network(format!(
                "mock algod dropped round {height}"
            ))),
            Some(MockFailure::NotFound) => Err(ChainClientError::NotFound(height)),
            None if height > last_round => Err(ChainClientError::NotFound(height)),
            None => {
                let mut block = algod_block(height, &self.genesis_hash);
                block.prev = self.prev_of(height);
                Ok(block)
            }
        }
    }
}
