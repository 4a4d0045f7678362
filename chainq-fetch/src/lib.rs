//! A mempool-less chain fetching library for the chainq adapter layer.
//!
//! Holds the transport wrappers used by `chainq-state`:
//! - AlgodConnector: round-addressed client for the Algorand `algod` REST API (adapted family).
//! - JsonRpcConnector: hash-addressed client for Substrate JsonRPC nodes (native family).

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod algod;
pub mod chain;
pub mod jsonrpc;
