//! Tilekeep provides an in-memory cache subsystem for slippy-map tiles.
//!
//! A background worker intercepts tile and static-map requests, serves
//! cached entries, and preloads regions on demand, while a foreground
//! manager exposes the async API, events, and performance monitoring the
//! embedding application drives.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Application                        │
//! │   CacheManager ── events ── smart preloading ── stats   │
//! └────────────┬────────────────────────────────────────────┘
//!              │ command channel (mpsc + oneshot responses)
//! ┌────────────▼────────────────────────────────────────────┐
//! │                     CacheWorker                         │
//! │   request classifier ── TileStore ── preload batches    │
//! └────────────┬────────────────────────────────────────────┘
//!              │ TileFetcher (injectable)
//!              ▼
//!          tile servers
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilekeep::manager::{CacheManager, CacheManagerConfig, EventKind};
//! use tilekeep::worker::HttpTileFetcher;
//!
//! let manager = Arc::new(CacheManager::new(CacheManagerConfig::default()));
//! manager.init(Arc::new(HttpTileFetcher::new()?));
//!
//! manager.on(EventKind::PreloadProgress, |event| {
//!     // drive a progress bar
//! });
//! let batch = manager.preload_tiles(bounds, vec![11, 12, 13]).await?;
//! ```

pub mod adaptive;
pub mod coord;
pub mod manager;
pub mod map;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use adaptive::{AdaptiveConfig, AdaptiveController};
pub use coord::{LatLngBounds, TileCoord};
pub use manager::{
    CacheEvent, CacheManager, CacheManagerConfig, CacheManagerError, CacheStatistics, EventKind,
    SmartPreloadGuard, SmartPreloadOptions,
};
pub use map::MapView;
pub use store::{CacheInfo, ClearScope, ConfigPatch, StoreConfig};
pub use worker::{BatchId, HttpTileFetcher, PreloadProgress, TileFetcher};
