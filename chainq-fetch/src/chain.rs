//! Holds the chain client abstraction shared by all round-addressed connectors.

pub mod client;
pub mod error;
