//! Human-readable cache statistics.
//!
//! Pure presentation transform over a [`CacheInfo`] snapshot; nothing here
//! is cached or mutated.

use serde::Serialize;

use crate::store::CacheInfo;

/// Formatted usage summary derived from a cache info snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    /// Number of cached tiles.
    pub tile_count: usize,

    /// Formatted tile size, e.g. `"12.4 MB"`.
    pub tile_size: String,

    /// Number of cached static assets.
    pub static_count: usize,

    /// Formatted static asset size.
    pub static_size: String,

    /// Formatted aggregate size across both classes.
    pub total_size: String,

    /// Tile slots in use as a percentage of `max_tiles`.
    pub tile_usage_percent: f64,

    /// Aggregate size as a percentage of `max_size_bytes`.
    pub size_usage_percent: f64,
}

impl CacheStatistics {
    /// Build statistics from an info snapshot.
    pub fn from_info(info: &CacheInfo) -> Self {
        let total = info.total_size();
        Self {
            tile_count: info.tiles.count,
            tile_size: format_size(info.tiles.estimated_size),
            static_count: info.static_assets.count,
            static_size: format_size(info.static_assets.estimated_size),
            total_size: format_size(total),
            tile_usage_percent: percent(info.tiles.count as u64, info.config.max_tiles as u64),
            size_usage_percent: percent(total, info.config.max_size_bytes),
        }
    }
}

fn percent(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    used as f64 / limit as f64 * 100.0
}

/// Format a byte count with a binary-scaled unit.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let bytes = bytes as f64;
    if bytes >= GB {
        format!("{:.1} GB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes / KB)
    } else {
        format!("{} B", bytes as u64)
    }
}
