//! Store configuration and read-only info snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default retention age for tile entries.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default maximum number of tile entries.
pub const DEFAULT_MAX_TILES: usize = 1000;

/// Default aggregate byte budget across all entry classes.
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 50 * 1024 * 1024;

/// Tile store configuration.
///
/// Bounds the store's retention and capacity. `max_tiles` applies to the
/// tile entry class only; `max_size_bytes` applies across tiles and static
/// assets together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Age after which a tile entry is considered stale.
    pub max_age: Duration,

    /// Maximum count of tile entries retained.
    pub max_tiles: usize,

    /// Maximum aggregate size in bytes across all entry classes.
    pub max_size_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            max_tiles: DEFAULT_MAX_TILES,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

/// Partial configuration update.
///
/// Fields left as `None` keep their current value when merged. Updates are
/// last-write-wins; there is no versioning across concurrent updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub max_age: Option<Duration>,
    pub max_tiles: Option<usize>,
    pub max_size_bytes: Option<u64>,
}

impl ConfigPatch {
    /// A patch that changes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        self.max_age.is_none() && self.max_tiles.is_none() && self.max_size_bytes.is_none()
    }

    /// Merge this patch into a configuration, returning the result.
    pub fn apply_to(&self, config: &StoreConfig) -> StoreConfig {
        StoreConfig {
            max_age: self.max_age.unwrap_or(config.max_age),
            max_tiles: self.max_tiles.unwrap_or(config.max_tiles),
            max_size_bytes: self.max_size_bytes.unwrap_or(config.max_size_bytes),
        }
    }
}

/// Per-class counts and size accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    /// Number of entries in this class.
    pub count: usize,

    /// Sum of entry size estimates in bytes.
    pub estimated_size: u64,
}

/// Read-only snapshot of the store's contents and configuration.
///
/// Produced by `TileStore::info()` for reporting and for the adaptive
/// strategy controller. Never mutated by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// Tile-class accounting.
    pub tiles: ClassInfo,

    /// Static-asset-class accounting.
    pub static_assets: ClassInfo,

    /// Configuration in effect when the snapshot was taken.
    pub config: StoreConfig,
}

impl CacheInfo {
    /// Aggregate size across both entry classes.
    pub fn total_size(&self) -> u64 {
        self.tiles.estimated_size + self.static_assets.estimated_size
    }
}
