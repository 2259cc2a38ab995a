//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): client requests by status and source
//! - `proxy_request_duration_seconds` (histogram): time to relay
//! - `proxy_cache_events_total` (counter): hit, miss, store, reclaimed, error
//! - `proxy_cache_entries` (gauge): entries left after the last sweep
//! - `proxy_origin_queries_total` (counter): requests that reached an origin
//! - `proxy_secure_fallbacks_total` (counter): plaintext fallbacks

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// A counters summary is logged every this many requests.
pub const SUMMARY_INTERVAL: u64 = 20;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(status: u16, source: &'static str, start: Instant) {
    ::metrics::counter!(
        "proxy_requests_total",
        "status" => status.to_string(),
        "source" => source
    )
    .increment(1);
    ::metrics::histogram!("proxy_request_duration_seconds", "source" => source)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_secure_fallback() {
    ::metrics::counter!("proxy_secure_fallbacks_total").increment(1);
}

pub fn record_cache_event(event: &'static str) {
    ::metrics::counter!("proxy_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_size(entries: usize) {
    ::metrics::gauge!("proxy_cache_entries").set(entries as f64);
}

/// Process-wide request counters.
#[derive(Debug, Default)]
pub struct ProxyStats {
    total_requests: AtomicU64,
    cache_responses: AtomicU64,
    origin_queries: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub cache_responses: u64,
    pub origin_queries: u64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one client request, returning the new total.
    pub fn record_request(&self) -> u64 {
        self.total_requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_cache_response(&self) {
        self.cache_responses.fetch_add(1, Ordering::Relaxed);
        record_cache_event("hit");
    }

    pub fn record_origin_query(&self) {
        self.origin_queries.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("proxy_origin_queries_total").increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            cache_responses: self.cache_responses.load(Ordering::Relaxed),
            origin_queries: self.origin_queries.load(Ordering::Relaxed),
        }
    }

    /// Log the counters when `total` lands on the summary interval.
    pub fn log_summary_at(&self, total: u64) {
        if total % SUMMARY_INTERVAL != 0 {
            return;
        }
        let snapshot = self.snapshot();
        tracing::debug!(
            total_requests = snapshot.total_requests,
            cache_responses = snapshot.cache_responses,
            origin_queries = snapshot.origin_queries,
            "Request summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = ProxyStats::new();
        assert_eq!(stats.record_request(), 1);
        assert_eq!(stats.record_request(), 2);
        stats.record_cache_response();
        stats.record_origin_query();
        stats.record_origin_query();

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                total_requests: 2,
                cache_responses: 1,
                origin_queries: 2,
            }
        );
    }

    #[test]
    fn facade_calls_without_recorder_are_harmless() {
        record_request(200, "cache", Instant::now());
        record_secure_fallback();
        record_cache_size(3);
    }
}
