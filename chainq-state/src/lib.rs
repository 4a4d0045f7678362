//! Chainq's chain-adapter and block-fetch library.
//!
//! Serves every supported chain family through one hash-addressed rpc surface:
//! - AlgorandAdapter
//!    - Wraps a round-addressed algod client, derives block hashes and keeps a bounded
//!      hash registry so hash-addressed calls can be answered.
//! - SubstrateApi
//!    - Passes calls straight through to a substrate node's JsonRPC service.
//!
//! The BlockFetchPipeline consumes that surface to fetch, wrap and filter ranges of blocks.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Chainq's api library frontend.
pub mod service;

// Chain apis.
pub mod adapter;
pub mod patched;
pub mod rpc;
pub mod substrate;

// Block fetching.
pub mod pipeline;

// Exposed backend functionality.
pub mod config;
pub mod error;
pub mod registry;
pub mod status;
pub mod types;
