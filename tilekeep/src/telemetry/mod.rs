//! Cache performance telemetry.
//!
//! Lock-free atomic counters recorded on the worker's fetch path, sampled
//! periodically by the manager's performance monitor.
//!
//! ```text
//! Worker fetch path ─────► PerformanceMetrics ─────► PerformanceReport ─────► subscribers
//!                          (atomic counters)         (point-in-time copy)
//! ```
//!
//! Hits and misses are explicit: the tile store reports whether a lookup was
//! fresh, and the worker records that outcome here. Response timing is kept
//! only for the average-time statistic, not for hit inference.

mod metrics;

pub use metrics::{PerformanceMetrics, PerformanceReport};
