//! Query cache.
//!
//! - [`key`]: QueryKey, canonical identifiers for cached data sets
//! - [`entry`]: CacheEntry and freshness rules
//! - [`client`]: QueryClient, the cache service implementing ensure-data

pub mod client;
pub mod entry;
pub mod key;
