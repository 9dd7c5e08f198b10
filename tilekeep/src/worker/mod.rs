//! Background cache worker.
//!
//! The [`CacheWorker`] is a long-running background task that owns the tile
//! store and is the only entity that touches network fetches for map tiles.
//! It outlives any single foreground view.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         CacheWorker                            │
//! │                                                                │
//! │  WorkerCommand ──► ┌──────────────┐                            │
//! │  (mpsc)            │ Command loop │──► oneshot response        │
//! │                    └──────┬───────┘                            │
//! │                           │ Fetch / PreloadTiles               │
//! │                           ▼                                    │
//! │                    ┌──────────────┐     ┌───────────────┐      │
//! │                    │  TileStore   │◄───►│  TileFetcher  │      │
//! │                    │  get / put   │     │  (network)    │      │
//! │                    └──────────────┘     └───────────────┘      │
//! │                           │                                    │
//! │                           ▼                                    │
//! │                    WorkerEvent (broadcast): Ready, progress    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! The worker moves from `Installing` to `Controlling` when its command
//! loop starts. Only once controlling does it intercept fetches; before
//! that, tile requests pass straight through to the network uncached.
//!
//! # Example
//!
//! ```ignore
//! use tilekeep::worker::{CacheWorker, WorkerConfig, HttpTileFetcher};
//!
//! let fetcher = Arc::new(HttpTileFetcher::new()?);
//! let (worker, channels) = CacheWorker::new(WorkerConfig::default(), store_config, fetcher);
//! tokio::spawn(worker.run(shutdown.clone()));
//!
//! let gateway = TileGateway::new(channels.command_tx.clone());
//! let response = gateway.fetch("https://tiles.example.com/12/654/1583.png").await?;
//! ```

mod daemon;
pub(crate) mod fetch;
mod protocol;
mod request;

pub use daemon::{CacheWorker, TileGateway, WorkerChannels, WorkerConfig};
pub use fetch::{BoxFuture, FetchError, HttpTileFetcher, TileFetcher};
pub use protocol::{
    BatchId, FetchResponse, PreloadProgress, ServedFrom, WorkerCommand, WorkerError, WorkerEvent,
    WorkerState,
};
pub use request::{RequestClass, RequestClassifier};
