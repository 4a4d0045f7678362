//! Algorand `algod` REST client and response types.

pub mod connector;
pub mod response;
