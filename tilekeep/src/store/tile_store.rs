//! In-memory bounded store for tile and static-asset entries.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::config::{CacheInfo, ClassInfo, ConfigPatch, StoreConfig};

/// Class of a cached entry, tracked separately for accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryClass {
    /// A map tile image.
    Tile,
    /// A non-tile map resource (e.g. a pre-rendered snapshot).
    Static,
}

/// Scope selector for [`TileStore::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearScope {
    Tiles,
    Static,
    All,
}

impl ClearScope {
    fn matches(&self, class: EntryClass) -> bool {
        match self {
            ClearScope::Tiles => class == EntryClass::Tile,
            ClearScope::Static => class == EntryClass::Static,
            ClearScope::All => true,
        }
    }
}

/// Result of a store lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    /// Entry present and within `max_age`.
    Hit(Bytes),
    /// Entry present but older than `max_age`; treat as a miss. The entry
    /// still occupies capacity until evicted or overwritten.
    Stale,
    /// No entry under this key.
    Miss,
}

impl GetOutcome {
    /// True only for a fresh hit.
    pub fn is_hit(&self) -> bool {
        matches!(self, GetOutcome::Hit(_))
    }
}

/// Structural store failures.
///
/// Ordinary misses are not errors; only conditions that prevent a write are
/// reported. Callers must treat these as non-fatal: serve from network and
/// skip caching the entry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A single entry cannot fit inside the configured byte budget.
    #[error("Entry too large: {size} bytes (budget: {budget})")]
    EntryTooLarge { size: u64, budget: u64 },
}

/// A cached entry with the metadata capacity accounting needs.
#[derive(Debug, Clone)]
struct StoreEntry {
    payload: Bytes,
    class: EntryClass,
    stored_at: Instant,
    size_estimate: u64,
}

/// Bounded in-memory store for tiles and static assets.
///
/// The store is single-writer by design: the background worker owns it and
/// all mutation flows through worker command handling. Methods take
/// `&mut self`; the worker wraps the store for shared access across its
/// preload tasks.
#[derive(Debug)]
pub struct TileStore {
    entries: HashMap<String, StoreEntry>,
    config: StoreConfig,
}

impl TileStore {
    /// Create an empty store with the given configuration.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
        }
    }

    /// Look up an entry, applying the freshness check.
    ///
    /// Returns [`GetOutcome::Stale`] rather than the payload when the entry
    /// has outlived `max_age`; callers must then fetch from network and
    /// `put` the replacement.
    pub fn get(&self, key: &str) -> GetOutcome {
        match self.entries.get(key) {
            Some(entry) => {
                if entry.stored_at.elapsed() < self.config.max_age {
                    GetOutcome::Hit(entry.payload.clone())
                } else {
                    GetOutcome::Stale
                }
            }
            None => GetOutcome::Miss,
        }
    }

    /// Write or overwrite an entry, then evict until within bounds.
    ///
    /// Eviction removes oldest-`stored_at` entries first, preferring stale
    /// ones. The entry just written is timestamped now and therefore never
    /// the first victim.
    ///
    /// # Errors
    ///
    /// [`StoreError::EntryTooLarge`] if the entry alone exceeds the byte
    /// budget; the store is left unchanged.
    pub fn put(
        &mut self,
        key: impl Into<String>,
        class: EntryClass,
        payload: Bytes,
        size_estimate: u64,
    ) -> Result<(), StoreError> {
        if size_estimate > self.config.max_size_bytes {
            return Err(StoreError::EntryTooLarge {
                size: size_estimate,
                budget: self.config.max_size_bytes,
            });
        }

        self.entries.insert(
            key.into(),
            StoreEntry {
                payload,
                class,
                stored_at: Instant::now(),
                size_estimate,
            },
        );
        self.evict_to_bounds();
        Ok(())
    }

    /// Remove all entries in the given scope unconditionally.
    pub fn clear(&mut self, scope: ClearScope) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !scope.matches(entry.class));
        let removed = before - self.entries.len();
        debug!(?scope, removed, "Cleared cache entries");
        removed
    }

    /// Snapshot counts, sizes, and configuration.
    pub fn info(&self) -> CacheInfo {
        let mut tiles = ClassInfo::default();
        let mut static_assets = ClassInfo::default();
        for entry in self.entries.values() {
            let class_info = match entry.class {
                EntryClass::Tile => &mut tiles,
                EntryClass::Static => &mut static_assets,
            };
            class_info.count += 1;
            class_info.estimated_size += entry.size_estimate;
        }
        CacheInfo {
            tiles,
            static_assets,
            config: self.config,
        }
    }

    /// Merge a partial configuration update.
    ///
    /// Does not evict retroactively; the next `put` runs the capacity check
    /// against the new bounds. A shrunk `max_age` takes effect immediately
    /// for freshness checks since `get` compares against the live config.
    pub fn update_config(&mut self, patch: ConfigPatch) {
        self.config = patch.apply_to(&self.config);
    }

    /// Current configuration.
    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Whether the key is present and fresh, without cloning the payload.
    pub fn contains_fresh(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.stored_at.elapsed() < self.config.max_age)
    }

    fn tile_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.class == EntryClass::Tile)
            .count()
    }

    fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size_estimate).sum()
    }

    /// Evict until both the tile count and aggregate size bounds hold.
    fn evict_to_bounds(&mut self) {
        while self.tile_count() > self.config.max_tiles {
            if !self.evict_one(Some(EntryClass::Tile)) {
                break;
            }
        }
        while self.total_size() > self.config.max_size_bytes {
            if !self.evict_one(None) {
                break;
            }
        }
    }

    /// Remove the single best eviction victim, optionally restricted to one
    /// class. Victims are stale entries oldest-first, then fresh entries
    /// oldest-first. Returns false when no candidate exists.
    fn evict_one(&mut self, class: Option<EntryClass>) -> bool {
        let max_age = self.config.max_age;
        let victim = self
            .entries
            .iter()
            .filter(|(_, e)| class.is_none_or(|c| e.class == c))
            .min_by_key(|(_, e)| {
                let stale = e.stored_at.elapsed() >= max_age;
                // Stale entries sort before fresh ones, then by age
                (!stale, e.stored_at)
            })
            .map(|(k, _)| k.clone());

        match victim {
            Some(key) => {
                debug!(key = %key, "Evicting cache entry");
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }
}

impl Default for TileStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tile_config(max_tiles: usize) -> StoreConfig {
        StoreConfig {
            max_tiles,
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_get_miss_on_empty_store() {
        let store = TileStore::default();
        assert_eq!(store.get("tile:10:1:1"), GetOutcome::Miss);
    }

    #[test]
    fn test_put_then_get_hit() {
        let mut store = TileStore::default();
        store
            .put("tile:10:1:1", EntryClass::Tile, Bytes::from_static(b"png"), 3)
            .unwrap();
        assert!(store.get("tile:10:1:1").is_hit());
    }

    #[test]
    fn test_entry_expires_after_max_age() {
        let mut store = TileStore::new(StoreConfig {
            max_age: Duration::from_millis(50),
            ..StoreConfig::default()
        });
        store
            .put("tile:10:1:1", EntryClass::Tile, Bytes::from_static(b"png"), 3)
            .unwrap();
        assert!(store.get("tile:10:1:1").is_hit());

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(store.get("tile:10:1:1"), GetOutcome::Stale);
    }

    #[test]
    fn test_shrinking_max_age_applies_to_existing_entries() {
        let mut store = TileStore::default();
        store
            .put("tile:10:1:1", EntryClass::Tile, Bytes::from_static(b"png"), 3)
            .unwrap();

        std::thread::sleep(Duration::from_millis(30));
        store.update_config(ConfigPatch {
            max_age: Some(Duration::from_millis(10)),
            ..Default::default()
        });
        assert_eq!(store.get("tile:10:1:1"), GetOutcome::Stale);
    }

    #[test]
    fn test_max_tiles_evicts_oldest_first() {
        let mut store = TileStore::new(tile_config(2));
        store
            .put("tile:a", EntryClass::Tile, Bytes::from_static(b"a"), 1)
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        store
            .put("tile:b", EntryClass::Tile, Bytes::from_static(b"b"), 1)
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        store
            .put("tile:c", EntryClass::Tile, Bytes::from_static(b"c"), 1)
            .unwrap();

        let info = store.info();
        assert_eq!(info.tiles.count, 2);
        assert_eq!(store.get("tile:a"), GetOutcome::Miss);
        assert!(store.get("tile:b").is_hit());
        assert!(store.get("tile:c").is_hit());
    }

    #[test]
    fn test_max_size_bounds_all_classes() {
        let mut store = TileStore::new(StoreConfig {
            max_size_bytes: 2500,
            ..StoreConfig::default()
        });
        store
            .put("static:snap", EntryClass::Static, Bytes::from(vec![0u8; 1000]), 1000)
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        store
            .put("tile:a", EntryClass::Tile, Bytes::from(vec![0u8; 1000]), 1000)
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        store
            .put("tile:b", EntryClass::Tile, Bytes::from(vec![0u8; 1000]), 1000)
            .unwrap();

        let info = store.info();
        assert!(info.total_size() <= 2500);
        // Oldest entry across classes was the static asset
        assert_eq!(store.get("static:snap"), GetOutcome::Miss);
    }

    #[test]
    fn test_stale_entries_are_preferred_victims() {
        let mut store = TileStore::new(StoreConfig {
            max_tiles: 2,
            max_age: Duration::from_millis(20),
            ..StoreConfig::default()
        });
        store
            .put("tile:old", EntryClass::Tile, Bytes::from_static(b"a"), 1)
            .unwrap();
        std::thread::sleep(Duration::from_millis(40));

        // tile:old is now stale; the next two puts must evict it, not each other
        store
            .put("tile:b", EntryClass::Tile, Bytes::from_static(b"b"), 1)
            .unwrap();
        store
            .put("tile:c", EntryClass::Tile, Bytes::from_static(b"c"), 1)
            .unwrap();

        assert_eq!(store.get("tile:old"), GetOutcome::Miss);
        assert!(store.get("tile:b").is_hit());
        assert!(store.get("tile:c").is_hit());
    }

    #[test]
    fn test_put_rejects_oversized_entry() {
        let mut store = TileStore::new(StoreConfig {
            max_size_bytes: 100,
            ..StoreConfig::default()
        });
        let result = store.put("tile:big", EntryClass::Tile, Bytes::from(vec![0u8; 200]), 200);
        assert!(matches!(result, Err(StoreError::EntryTooLarge { .. })));
        assert_eq!(store.info().tiles.count, 0);
    }

    #[test]
    fn test_overwrite_refreshes_timestamp() {
        let mut store = TileStore::new(StoreConfig {
            max_age: Duration::from_millis(60),
            ..StoreConfig::default()
        });
        store
            .put("tile:a", EntryClass::Tile, Bytes::from_static(b"v1"), 2)
            .unwrap();
        std::thread::sleep(Duration::from_millis(40));
        store
            .put("tile:a", EntryClass::Tile, Bytes::from_static(b"v2"), 2)
            .unwrap();
        std::thread::sleep(Duration::from_millis(40));

        // 80ms after v1 but only 40ms after v2: still fresh
        assert_eq!(
            store.get("tile:a"),
            GetOutcome::Hit(Bytes::from_static(b"v2"))
        );
        assert_eq!(store.info().tiles.count, 1);
    }

    #[test]
    fn test_clear_tiles_leaves_static() {
        let mut store = TileStore::default();
        store
            .put("tile:a", EntryClass::Tile, Bytes::from_static(b"a"), 1)
            .unwrap();
        store
            .put("static:s", EntryClass::Static, Bytes::from_static(b"s"), 1)
            .unwrap();

        store.clear(ClearScope::Tiles);

        let info = store.info();
        assert_eq!(info.tiles.count, 0);
        assert_eq!(info.static_assets.count, 1);
        assert_eq!(store.get("tile:a"), GetOutcome::Miss);
    }

    #[test]
    fn test_clear_all_is_idempotent() {
        let mut store = TileStore::default();
        store
            .put("tile:a", EntryClass::Tile, Bytes::from_static(b"a"), 1)
            .unwrap();
        store
            .put("static:s", EntryClass::Static, Bytes::from_static(b"s"), 1)
            .unwrap();

        store.clear(ClearScope::All);
        let first = store.info();
        store.clear(ClearScope::All);
        let second = store.info();

        assert_eq!(first.tiles.count, 0);
        assert_eq!(first.static_assets.count, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_config_merge_leaves_other_fields() {
        let mut store = TileStore::default();
        let before = store.config();
        store.update_config(ConfigPatch {
            max_tiles: Some(7),
            ..Default::default()
        });

        let after = store.config();
        assert_eq!(after.max_tiles, 7);
        assert_eq!(after.max_age, before.max_age);
        assert_eq!(after.max_size_bytes, before.max_size_bytes);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // After every put, both capacity bounds hold.
            #[test]
            fn capacity_bounds_hold_after_every_put(
                sizes in prop::collection::vec(1u64..2000, 1..40),
                max_tiles in 1usize..10,
                max_size in 2000u64..20_000,
            ) {
                let mut store = TileStore::new(StoreConfig {
                    max_tiles,
                    max_size_bytes: max_size,
                    ..StoreConfig::default()
                });

                for (i, size) in sizes.iter().enumerate() {
                    store
                        .put(
                            format!("tile:{i}"),
                            EntryClass::Tile,
                            Bytes::from(vec![0u8; *size as usize]),
                            *size,
                        )
                        .unwrap();

                    let info = store.info();
                    prop_assert!(info.tiles.count <= max_tiles);
                    prop_assert!(info.total_size() <= max_size);
                }
            }
        }
    }
}
