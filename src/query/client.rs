//! The query client: an explicitly owned, process-wide query cache.
//!
//! The client is the only writer of the cache. Its central operation,
//! [`QueryClient::ensure_data`], returns fresh cached data without touching the
//! network, and otherwise runs exactly one fetch per key no matter how many
//! callers ask concurrently:
//! - the first caller registers a shared pending-result handle in the
//!   in-flight registry and spawns the fetch
//! - later callers attach to that handle instead of starting new work
//! - the fetch task stores the value (on success only) and clears the
//!   handle, whether or not anybody is still waiting for it

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{FetchError, FetchResult};
use crate::metrics::QueryMetrics;
use crate::query::entry::{CacheEntry, CachedValue};
use crate::query::key::QueryKey;

/// A pending fetch that any number of callers can await.
type SharedFetch = Shared<BoxFuture<'static, FetchResult<CachedValue>>>;

/// Freshness policy applied by the client.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Age after which an entry is stale (`None` = only invalidation makes it stale).
    pub stale_time: Option<Duration>,

    /// Default for [`EnsureOptions::revalidate_if_stale`].
    pub revalidate_if_stale: bool,
}

impl From<&CacheConfig> for QueryOptions {
    fn from(cfg: &CacheConfig) -> Self {
        Self {
            stale_time: cfg.stale_time(),
            revalidate_if_stale: cfg.revalidate_if_stale,
        }
    }
}

/// Per-call options for [`QueryClient::ensure_data_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsureOptions {
    /// Return a stale value immediately and refetch in the background.
    pub revalidate_if_stale: bool,
}

/// A registered fetch. `invalidated` records an invalidation that arrived
/// after the request was issued; the result is then stored already stale.
struct InFlight {
    pending: SharedFetch,
    invalidated: bool,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKey, CacheEntry>,
    in_flight: HashMap<QueryKey, InFlight>,
}

struct Inner {
    state: Mutex<CacheState>,
    options: QueryOptions,
    metrics: QueryMetrics,
}

/// Handle to a query cache. Cloning is cheap; clones share the same cache.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl QueryClient {
    /// Create a new, empty query cache.
    pub fn new(options: QueryOptions) -> prometheus::Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState::default()),
                options,
                metrics: QueryMetrics::new()?,
            }),
        })
    }

    pub fn metrics(&self) -> &QueryMetrics {
        &self.inner.metrics
    }

    /// Return the cached value for `key`, fetching it once if absent or stale.
    ///
    /// Uses the client's default options.
    pub async fn ensure_data<F, Fut>(&self, key: &QueryKey, fetch: F) -> FetchResult<CachedValue>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<CachedValue>> + Send + 'static,
    {
        let opts = EnsureOptions {
            revalidate_if_stale: self.inner.options.revalidate_if_stale,
        };
        self.ensure_data_with(key, fetch, opts).await
    }

    /// [`ensure_data`](Self::ensure_data) with explicit per-call options.
    pub async fn ensure_data_with<F, Fut>(
        &self,
        key: &QueryKey,
        fetch: F,
        opts: EnsureOptions,
    ) -> FetchResult<CachedValue>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<CachedValue>> + Send + 'static,
    {
        let metrics = &self.inner.metrics;
        let pending = {
            let mut state = self.inner.state.lock().await;

            if let Some(entry) = state.entries.get_mut(key) {
                if !entry.is_stale(self.inner.options.stale_time, Instant::now()) {
                    entry.touch();
                    metrics.cache_hits.with_label_values(&[key.path()]).inc();
                    debug!(key = %key, "Cache hit");
                    return Ok(entry.data.clone());
                }

                if opts.revalidate_if_stale {
                    entry.touch();
                    let stale = entry.data.clone();
                    metrics.stale_serves.with_label_values(&[key.path()]).inc();
                    debug!(key = %key, "Serving stale data, revalidating in background");
                    // The handle is dropped; the spawned task still updates the cache.
                    let _ = self.start_or_join(&mut state, key, fetch);
                    return Ok(stale);
                }
            }

            metrics.cache_misses.with_label_values(&[key.path()]).inc();
            self.start_or_join(&mut state, key, fetch)
        };

        pending.await
    }

    /// Fetch `key` unless a fresh value is cached, always awaiting a refetch of
    /// stale data.
    pub async fn fetch_query<F, Fut>(&self, key: &QueryKey, fetch: F) -> FetchResult<CachedValue>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<CachedValue>> + Send + 'static,
    {
        self.ensure_data_with(key, fetch, EnsureOptions::default())
            .await
    }

    /// Warm the cache for `key`. Failures are logged, not returned.
    pub async fn prefetch_query<F, Fut>(&self, key: &QueryKey, fetch: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<CachedValue>> + Send + 'static,
    {
        if let Err(e) = self.fetch_query(key, fetch).await {
            warn!(key = %key, error = %e, "Prefetch failed");
        }
    }

    /// Register (or join) the in-flight fetch for `key`. Must be called with
    /// the state lock held so the check and the registration are atomic.
    fn start_or_join<F, Fut>(&self, state: &mut CacheState, key: &QueryKey, fetch: F) -> SharedFetch
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<CachedValue>> + Send + 'static,
    {
        let metrics = &self.inner.metrics;

        if let Some(flight) = state.in_flight.get(key) {
            metrics.dedup_joins.with_label_values(&[key.path()]).inc();
            debug!(key = %key, "Joining in-flight fetch");
            return flight.pending.clone();
        }

        metrics.fetches.with_label_values(&[key.path()]).inc();
        metrics.in_flight.inc();
        debug!(key = %key, "Starting fetch");

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let result = match AssertUnwindSafe(async move { fetch().await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::Aborted("fetch panicked".to_string())),
            };
            inner.complete(&task_key, &result).await;
            result
        });

        let pending: SharedFetch = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(FetchError::Aborted(e.to_string())),
            }
        }
        .boxed()
        .shared();

        state.in_flight.insert(
            key.clone(),
            InFlight {
                pending: pending.clone(),
                invalidated: false,
            },
        );
        pending
    }

    /// Read the cached value for `key` without fetching, fresh or not.
    pub async fn get_query_data(&self, key: &QueryKey) -> Option<CachedValue> {
        let state = self.inner.state.lock().await;
        state.entries.get(key).map(|e| e.data.clone())
    }

    /// Store `data` under `key` as fresh, replacing any previous value.
    pub async fn set_query_data(&self, key: &QueryKey, data: CachedValue) {
        let mut state = self.inner.state.lock().await;
        match state.entries.get_mut(key) {
            Some(entry) => entry.replace(data),
            None => {
                state.entries.insert(key.clone(), CacheEntry::new(data));
            }
        }
        debug!(key = %key, "Query data set");
    }

    /// Mark `key` stale so the next ensure refetches. A fetch already in flight
    /// still completes, but its result is stored stale.
    ///
    /// Returns whether an entry or an in-flight fetch was found.
    pub async fn invalidate(&self, key: &QueryKey) -> bool {
        let mut state = self.inner.state.lock().await;
        let found = state.invalidate_key(key);
        if found {
            debug!(key = %key, "Invalidated");
        }
        found
    }

    /// Invalidate every key whose path falls under `prefix`. Returns the number
    /// of distinct keys affected, cached or in flight.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = self.inner.state.lock().await;
        let keys: HashSet<QueryKey> = state
            .entries
            .keys()
            .chain(state.in_flight.keys())
            .filter(|k| k.matches_prefix(prefix))
            .cloned()
            .collect();
        for key in &keys {
            state.invalidate_key(key);
        }
        let count = keys.len();
        if count > 0 {
            info!(prefix, count, "Invalidated queries");
        }
        count
    }

    /// Drop the entry for `key`. An in-flight fetch is left running and will
    /// store its result when it completes.
    pub async fn remove(&self, key: &QueryKey) -> bool {
        let mut state = self.inner.state.lock().await;
        state.entries.remove(key).is_some()
    }

    /// Whether a fetch for `key` is currently in flight.
    pub async fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner.state.lock().await.in_flight.contains_key(key)
    }

    /// Snapshot of the cache for monitoring.
    pub async fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock().await;
        let now = Instant::now();
        let mut entries: Vec<EntryStats> = state
            .entries
            .iter()
            .map(|(key, entry)| EntryStats {
                key: key.to_string(),
                age_ms: now.saturating_duration_since(entry.updated_at).as_millis() as u64,
                stale: entry.is_stale(self.inner.options.stale_time, now),
                fetching: state.in_flight.contains_key(key),
                fetch_count: entry.fetch_count,
                hit_count: entry.hit_count,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            total_entries: state.entries.len(),
            in_flight: state.in_flight.len(),
            entries,
        }
    }
}

impl CacheState {
    fn invalidate_key(&mut self, key: &QueryKey) -> bool {
        let mut found = false;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.invalidated = true;
            found = true;
        }
        if let Some(flight) = self.in_flight.get_mut(key) {
            flight.invalidated = true;
            found = true;
        }
        found
    }
}

impl Inner {
    /// Called by the fetch task once the fetch settles.
    async fn complete(&self, key: &QueryKey, result: &FetchResult<CachedValue>) {
        let mut state = self.state.lock().await;
        let invalidated = state
            .in_flight
            .remove(key)
            .is_some_and(|flight| flight.invalidated);
        self.metrics.in_flight.dec();

        match result {
            Ok(data) => {
                let entry = state
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| CacheEntry::new(data.clone()));
                entry.replace(data.clone());
                entry.invalidated = invalidated;
                entry.fetch_count += 1;
                debug!(
                    key = %key,
                    fetch_count = entry.fetch_count,
                    stale = invalidated,
                    "Fetch stored"
                );
            }
            Err(e) => {
                // Nothing is written; the entry keeps its pre-fetch state.
                self.metrics
                    .fetch_failures
                    .with_label_values(&[key.path()])
                    .inc();
                warn!(key = %key, error = %e, "Fetch failed");
            }
        }
    }
}

/// Per-entry statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EntryStats {
    pub key: String,
    pub age_ms: u64,
    pub stale: bool,
    pub fetching: bool,
    pub fetch_count: u64,
    pub hit_count: u64,
}

/// Cache-wide statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub in_flight: usize,
    pub entries: Vec<EntryStats>,
}
