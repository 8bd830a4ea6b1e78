//! Serving metrics.
//!
//! `MockMetrics` holds the per-server counters reported by the admin API.
//! The same events are mirrored into process-wide Prometheus collectors.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

lazy_static! {
    /// Requests served, by outcome: matched|unmatched|chaos
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "tracetap_mock_requests_total",
        "Total number of mock requests served",
        &["method", "outcome"]
    )
    .unwrap();

    /// Match cache lookups, by result: hit|miss
    pub static ref MATCH_CACHE_TOTAL: CounterVec = register_counter_vec!(
        "tracetap_mock_match_cache_total",
        "Match cache lookups",
        &["result"]
    )
    .unwrap();

    /// Matching time in milliseconds
    pub static ref MATCH_DURATION_MS: HistogramVec = register_histogram_vec!(
        "tracetap_mock_match_duration_ms",
        "Time spent finding a matching capture",
        &["strategy"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 1000.0, 10000.0]
    )
    .unwrap();

    /// End-to-end request time in milliseconds, delays included
    pub static ref REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "tracetap_mock_request_duration_ms",
        "Total mock request duration",
        &["outcome"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();
}

/// Prometheus text exposition of all collectors.
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    MATCH_CACHE_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_match_duration(strategy: &str, duration_ms: f64) {
    MATCH_DURATION_MS
        .with_label_values(&[strategy])
        .observe(duration_ms);
}

/// Per-server counters. Increments are lock-free.
#[derive(Debug)]
pub struct MockMetrics {
    total_requests: AtomicU64,
    matched_requests: AtomicU64,
    unmatched_requests: AtomicU64,
    chaos_failures: AtomicU64,
    start_time: RwLock<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub matched_requests: u64,
    pub unmatched_requests: u64,
    pub chaos_failures: u64,
    /// Percentage of requests matched, two decimals
    pub match_rate: f64,
    pub uptime_seconds: f64,
    pub start_time: String,
}

impl Default for MockMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            matched_requests: AtomicU64::new(0),
            unmatched_requests: AtomicU64::new(0),
            chaos_failures: AtomicU64::new(0),
            start_time: RwLock::new(Utc::now()),
        }
    }

    pub fn record_received(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_matched(&self, method: &str, duration_ms: f64) {
        self.matched_requests.fetch_add(1, Ordering::Relaxed);
        REQUESTS_TOTAL.with_label_values(&[method, "matched"]).inc();
        REQUEST_DURATION_MS
            .with_label_values(&["matched"])
            .observe(duration_ms);
    }

    pub fn record_unmatched(&self, method: &str, duration_ms: f64) {
        self.unmatched_requests.fetch_add(1, Ordering::Relaxed);
        REQUESTS_TOTAL.with_label_values(&[method, "unmatched"]).inc();
        REQUEST_DURATION_MS
            .with_label_values(&["unmatched"])
            .observe(duration_ms);
    }

    pub fn record_chaos_failure(&self, method: &str) {
        self.chaos_failures.fetch_add(1, Ordering::Relaxed);
        REQUESTS_TOTAL.with_label_values(&[method, "chaos"]).inc();
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests();
        let matched = self.matched_requests.load(Ordering::Relaxed);
        let start = *self.start_time.read();
        let uptime = (Utc::now() - start).num_milliseconds() as f64 / 1000.0;

        MetricsSnapshot {
            total_requests: total,
            matched_requests: matched,
            unmatched_requests: self.unmatched_requests.load(Ordering::Relaxed),
            chaos_failures: self.chaos_failures.load(Ordering::Relaxed),
            match_rate: if total == 0 {
                0.0
            } else {
                round2(matched as f64 / total as f64 * 100.0)
            },
            uptime_seconds: round2(uptime),
            start_time: start.to_rfc3339(),
        }
    }

    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.matched_requests.store(0, Ordering::Relaxed);
        self.unmatched_requests.store(0, Ordering::Relaxed);
        self.chaos_failures.store(0, Ordering::Relaxed);
        *self.start_time.write() = Utc::now();
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
