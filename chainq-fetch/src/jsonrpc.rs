//! JsonRPC client used to talk to Substrate based nodes.

pub mod connector;
pub mod error;
pub mod response;
