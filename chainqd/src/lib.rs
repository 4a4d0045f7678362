//! Chainq daemon library.
//!
//! Loads the daemon config, connects the configured chain api and drives the block fetch
//! pipeline over the configured height range.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod indexer;
