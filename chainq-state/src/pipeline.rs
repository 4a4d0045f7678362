//! Block fetch pipeline.
//!
//! Fetches ranges or sets of blocks through a [`ChainApi`](crate::rpc::ChainApi), wraps them
//! with their events and runtime version, and filters the result for the mapping layer.

pub mod fetch;
pub mod filter;
pub mod wrap;

pub use fetch::BlockFetchPipeline;
pub use filter::{filter_block, filter_events, filter_extrinsics, FilterSpec, SpecVersionRange};
pub use wrap::{
    wrap_block, wrap_events, wrap_extrinsics, IndexedBlock, WrappedEvent, WrappedExtrinsic,
};
