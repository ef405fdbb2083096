//! Typed RPC client.
//!
//! - [`transport`]: RpcTransport trait and the HTTP implementation
//! - [`utils`]: ApiUtils / Procedure, cache-backed typed procedure calls
//! - [`types`]: procedure output types

pub mod transport;
pub mod types;
pub mod utils;
