//! Bounded tile store.
//!
//! The store holds fetched tile responses and static map assets keyed by
//! canonical request signature. It enforces three limits from
//! [`StoreConfig`]:
//!
//! - `max_age`: entries older than this are stale and served as misses
//! - `max_tiles`: maximum count of tile-class entries
//! - `max_size_bytes`: aggregate byte budget across all entry classes
//!
//! Eviction is oldest-`stored_at`-first. No access-frequency tracking is
//! kept; the store trades hit rate for a predictable, easily audited
//! policy. Stale entries are preferred eviction victims since they can no
//! longer be served.
//!
//! The store is owned by the background worker and is never touched
//! directly by the foreground manager.

mod config;
mod tile_store;

pub use config::{ClassInfo, CacheInfo, ConfigPatch, StoreConfig};
pub use tile_store::{ClearScope, EntryClass, GetOutcome, StoreError, TileStore};
