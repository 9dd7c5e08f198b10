//! Atomic counters for cache hit/miss accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Running counters for presumed cache performance.
///
/// Counters are process-lifetime; there is no explicit reset. All updates
/// are relaxed atomics since the monitor only needs eventually-consistent
/// totals.
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    /// Sum of observed response times in microseconds.
    response_micros: AtomicU64,
}

impl PerformanceMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request served from the store.
    pub fn record_hit(&self, elapsed: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.response_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a request that went to the network (miss or stale).
    pub fn record_miss(&self, elapsed: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.response_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Total requests observed since creation.
    pub fn total_requests(&self) -> u64 {
        self.hits.load(Ordering::Relaxed) + self.misses.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of the counters as a rate report.
    ///
    /// Returns `None` when no requests have been observed yet, so consumers
    /// never see a fabricated 0% hit rate.
    pub fn report(&self) -> Option<PerformanceReport> {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return None;
        }
        let micros = self.response_micros.load(Ordering::Relaxed);
        Some(PerformanceReport {
            cache_hit_rate: hits as f64 / total as f64,
            total_requests: total,
            average_time_ms: micros as f64 / total as f64 / 1000.0,
        })
    }
}

/// Snapshot of cache performance for subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Fraction of requests served from the store, in [0, 1].
    pub cache_hit_rate: f64,

    /// Total requests observed since process start.
    pub total_requests: u64,

    /// Mean response time across all observed requests, in milliseconds.
    pub average_time_ms: f64,
}
