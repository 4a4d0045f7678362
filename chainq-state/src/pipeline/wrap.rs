//! Wraps fetched blocks with the context the mapping layer needs.

use serde_json::Value;

use crate::{
    error::FetchError,
    types::{BlockHash, BlockNumber, EventRecord, Extrinsic, Phase, SignedBlock},
};

/// A block together with its events and the runtime version it was executed with.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedBlock {
    /// The block.
    pub block: SignedBlock,
    /// Block hash.
    pub hash: BlockHash,
    /// Spec version of the runtime that executed the block.
    pub spec_version: u32,
    /// Block timestamp in milliseconds, from the `timestamp.set` extrinsic.
    pub timestamp: Option<u64>,
    /// Events emitted in the block.
    pub events: Vec<EventRecord>,
}

impl IndexedBlock {
    /// Returns the block number.
    pub fn number(&self) -> BlockNumber {
        self.block.number()
    }
}

/// An extrinsic with the events it emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedExtrinsic {
    /// Position in the block.
    pub idx: u32,
    /// The extrinsic.
    pub extrinsic: Extrinsic,
    /// Hash of the including block.
    pub block_hash: BlockHash,
    /// Number of the including block.
    pub block_number: BlockNumber,
    /// Spec version of the including block.
    pub spec_version: u32,
    /// Events emitted while applying the extrinsic.
    pub events: Vec<EventRecord>,
    /// True if an `ExtrinsicSuccess` event was emitted.
    pub success: bool,
}

/// An event with its position and originating extrinsic.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedEvent {
    /// Position in the block's events.
    pub idx: u32,
    /// The event.
    pub event: EventRecord,
    /// Hash of the including block.
    pub block_hash: BlockHash,
    /// Number of the including block.
    pub block_number: BlockNumber,
    /// Spec version of the including block.
    pub spec_version: u32,
    /// Index of the extrinsic that emitted the event, if any.
    pub extrinsic_idx: Option<u32>,
}

/// Wraps `block` with its events and spec version.
///
/// Fails [`FetchError::InvalidTimestamp`] if the block carries a `timestamp.set` extrinsic
/// whose first argument is not a millisecond timestamp.
pub fn wrap_block(
    block: SignedBlock,
    events: Vec<EventRecord>,
    spec_version: u32,
) -> Result<IndexedBlock, FetchError> {
    let timestamp = timestamp(&block)?;
    Ok(IndexedBlock {
        hash: block.hash(),
        block,
        spec_version,
        timestamp,
        events,
    })
}

fn timestamp(block: &SignedBlock) -> Result<Option<u64>, FetchError> {
    let Some(set) = block
        .block
        .extrinsics
        .iter()
        .find(|e| e.section == "timestamp" && e.method == "set")
    else {
        return Ok(None);
    };

    let millis = match set.args.first() {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    millis
        .map(Some)
        .ok_or(FetchError::InvalidTimestamp {
            height: block.number(),
        })
}

fn emitted_by(idx: u32) -> impl Fn(&&EventRecord) -> bool {
    move |record| record.phase == Phase::ApplyExtrinsic(idx)
}

/// Wraps every extrinsic of `block` with the events it emitted.
pub fn wrap_extrinsics(block: &IndexedBlock) -> Vec<WrappedExtrinsic> {
    block
        .block
        .block
        .extrinsics
        .iter()
        .zip(0u32..)
        .map(|(extrinsic, idx)| {
            let events: Vec<EventRecord> = block
                .events
                .iter()
                .filter(emitted_by(idx))
                .cloned()
                .collect();
            let success = events
                .iter()
                .any(|record| record.event.method == "ExtrinsicSuccess");
            WrappedExtrinsic {
                idx,
                extrinsic: extrinsic.clone(),
                block_hash: block.hash,
                block_number: block.number(),
                spec_version: block.spec_version,
                events,
                success,
            }
        })
        .collect()
}

/// Wraps every event of `block`, linking extrinsic phase events to their extrinsic.
pub fn wrap_events(block: &IndexedBlock) -> Vec<WrappedEvent> {
    block
        .events
        .iter()
        .zip(0u32..)
        .map(|(event, idx)| WrappedEvent {
            idx,
            event: event.clone(),
            block_hash: block.hash,
            block_number: block.number(),
            spec_version: block.spec_version,
            extrinsic_idx: match event.phase {
                Phase::ApplyExtrinsic(extrinsic_idx) => Some(extrinsic_idx),
                _ => None,
            },
        })
        .collect()
}
