//! Prometheus metrics for the query cache.
//!
//! Each [`QueryClient`](crate::query::client::QueryClient) owns its own
//! registry, so several clients (tests, multiple tenants) never collide on
//! metric registration.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Counters for ensure-data outcomes, labelled by procedure path.
#[derive(Clone)]
pub struct QueryMetrics {
    registry: Registry,

    /// Ensure calls served from a fresh entry.
    pub cache_hits: IntCounterVec,

    /// Ensure calls served from a stale entry while a background refetch runs.
    pub stale_serves: IntCounterVec,

    /// Ensure calls that found no fresh entry.
    pub cache_misses: IntCounterVec,

    /// Underlying fetches started.
    pub fetches: IntCounterVec,

    /// Underlying fetches that failed.
    pub fetch_failures: IntCounterVec,

    /// Callers that attached to an already in-flight fetch.
    pub dedup_joins: IntCounterVec,

    /// Fetches currently in flight.
    pub in_flight: IntGauge,
}

impl QueryMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounterVec> {
            let c = IntCounterVec::new(Opts::new(name, help), &["path"])?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let cache_hits = counter("query_cache_hits_total", "Ensure calls served from a fresh entry")?;
        let stale_serves = counter(
            "query_stale_serves_total",
            "Ensure calls served stale data while revalidating",
        )?;
        let cache_misses = counter("query_cache_misses_total", "Ensure calls without a fresh entry")?;
        let fetches = counter("query_fetches_total", "Underlying fetches started")?;
        let fetch_failures = counter("query_fetch_failures_total", "Underlying fetches that failed")?;
        let dedup_joins = counter(
            "query_dedup_joins_total",
            "Callers attached to an in-flight fetch",
        )?;

        let in_flight = IntGauge::new("query_in_flight", "Fetches currently in flight")?;
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            registry,
            cache_hits,
            stale_serves,
            cache_misses,
            fetches,
            fetch_failures,
            dedup_joins,
            in_flight,
        })
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_instances_do_not_collide() {
        let a = QueryMetrics::new().unwrap();
        let b = QueryMetrics::new().unwrap();
        a.fetches.with_label_values(&["posts.list"]).inc();
        assert_eq!(a.fetches.with_label_values(&["posts.list"]).get(), 1);
        assert_eq!(b.fetches.with_label_values(&["posts.list"]).get(), 0);
    }

    #[test]
    fn test_render_contains_counters() {
        let m = QueryMetrics::new().unwrap();
        m.cache_hits.with_label_values(&["posts.list"]).inc();
        let text = m.render();
        assert!(text.contains("query_cache_hits_total{path=\"posts.list\"} 1"));
    }
}
