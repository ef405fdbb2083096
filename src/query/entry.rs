//! Cache entries and freshness.
//!
//! An entry holds the last successfully fetched value for a key. Values are
//! type-erased so one cache can hold every procedure's output; readers get an
//! `Arc` to the stored allocation, never a copy.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A type-erased cached value.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// A single query cache entry.
#[derive(Clone)]
pub struct CacheEntry {
    /// The stored value.
    pub data: CachedValue,

    /// When `data` was stored.
    pub updated_at: Instant,

    /// Set by invalidation; the next ensure treats the entry as stale.
    pub invalidated: bool,

    /// Number of successful fetches that have written this entry.
    pub fetch_count: u64,

    /// Number of cache hits served from this entry.
    pub hit_count: u64,
}

impl CacheEntry {
    /// Create an entry holding freshly stored data.
    pub fn new(data: CachedValue) -> Self {
        Self {
            data,
            updated_at: Instant::now(),
            invalidated: false,
            fetch_count: 0,
            hit_count: 0,
        }
    }

    /// Replace the stored data, making the entry fresh again.
    pub fn replace(&mut self, data: CachedValue) {
        self.data = data;
        self.updated_at = Instant::now();
        self.invalidated = false;
    }

    /// Record a cache hit.
    pub fn touch(&mut self) {
        self.hit_count += 1;
    }

    /// Whether the entry is stale at `now` under `stale_time`.
    ///
    /// With no stale time the entry only goes stale through invalidation.
    pub fn is_stale(&self, stale_time: Option<Duration>, now: Instant) -> bool {
        if self.invalidated {
            return true;
        }
        match stale_time {
            Some(ttl) => now.saturating_duration_since(self.updated_at) >= ttl,
            None => false,
        }
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("updated_at", &self.updated_at)
            .field("invalidated", &self.invalidated)
            .field("fetch_count", &self.fetch_count)
            .field("hit_count", &self.hit_count)
            .finish_non_exhaustive()
    }
}
