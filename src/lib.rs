//! route-preload: route loaders backed by a deduplicating query cache.
//!
//! A route loader asks the query cache to *ensure* a data set is present:
//! fresh cached data is returned without network access, otherwise exactly
//! one fetch runs per key, shared by every concurrent caller.
//!
//! Exposes the routes over HTTP for integration with a rendering frontend.

pub mod config;
pub mod error;
pub mod metrics;
pub mod query;
pub mod routes;
pub mod rpc;
pub mod server;
