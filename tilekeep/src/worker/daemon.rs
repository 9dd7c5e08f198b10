//! The cache worker daemon: command loop, fetch interception, preloading.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coord::{
    tiles_in_bounds, CoordError, LatLngBounds, TileCoord, MAX_ENUMERATED_TILES,
};
use crate::store::{EntryClass, GetOutcome, StoreConfig, TileStore};
use crate::telemetry::PerformanceMetrics;

use super::fetch::TileFetcher;
use super::protocol::{
    BatchId, FetchResponse, PreloadProgress, ServedFrom, WorkerCommand, WorkerError, WorkerEvent,
    WorkerState,
};
use super::request::{tile_key, RequestClass, RequestClassifier};

// =============================================================================
// Configuration
// =============================================================================

/// Default command channel capacity.
pub const DEFAULT_COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Default event broadcast capacity.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default number of concurrent fetches within a preload batch.
pub const DEFAULT_PRELOAD_CONCURRENCY: usize = 6;

/// Configuration for the cache worker.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// URL template used to fetch tiles during preloading, with `{z}`,
    /// `{x}`, `{y}` placeholders.
    pub tile_url_template: String,

    /// Concurrent fetches per preload batch.
    pub preload_concurrency: usize,

    /// Command channel capacity.
    pub command_capacity: usize,

    /// Event broadcast capacity.
    pub event_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tile_url_template: "https://tiles.example.com/{z}/{x}/{y}.png".to_string(),
            preload_concurrency: DEFAULT_PRELOAD_CONCURRENCY,
            command_capacity: DEFAULT_COMMAND_CHANNEL_CAPACITY,
            event_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Expand the tile URL template for one tile.
fn tile_url(template: &str, tile: &TileCoord) -> String {
    template
        .replace("{z}", &tile.zoom.to_string())
        .replace("{x}", &tile.col.to_string())
        .replace("{y}", &tile.row.to_string())
}

// =============================================================================
// Channels and gateway
// =============================================================================

/// Channel endpoints handed to the foreground when a worker is created.
#[derive(Clone)]
pub struct WorkerChannels {
    /// Sender for commands; clone freely for producers.
    pub command_tx: mpsc::Sender<WorkerCommand>,

    /// Broadcast of unsolicited worker events; call `subscribe()` per
    /// consumer.
    pub events: broadcast::Sender<WorkerEvent>,
}

/// Cloneable front for the worker's fetch interception path.
///
/// Host applications route their map-layer HTTP requests through this
/// gateway instead of calling the network directly; the worker serves fresh
/// entries from the store and fetches the rest.
#[derive(Clone)]
pub struct TileGateway {
    command_tx: mpsc::Sender<WorkerCommand>,
}

impl TileGateway {
    pub fn new(command_tx: mpsc::Sender<WorkerCommand>) -> Self {
        Self { command_tx }
    }

    /// Fetch a URL through the worker.
    ///
    /// Network failures propagate as [`WorkerError::Fetch`]; no synthetic
    /// response is fabricated.
    pub async fn fetch(&self, url: impl Into<String>) -> Result<FetchResponse, WorkerError> {
        let (respond_to, response) = oneshot::channel();
        self.command_tx
            .send(WorkerCommand::Fetch {
                url: url.into(),
                respond_to,
            })
            .await
            .map_err(|_| WorkerError::Unavailable)?;
        response.await.map_err(|_| WorkerError::Unavailable)?
    }
}

// =============================================================================
// Worker
// =============================================================================

/// State shared between the command loop and its spawned request tasks.
#[derive(Clone)]
struct WorkerShared {
    config: Arc<WorkerConfig>,
    classifier: RequestClassifier,
    store: Arc<Mutex<TileStore>>,
    fetcher: Arc<dyn TileFetcher>,
    metrics: Arc<PerformanceMetrics>,
    state: Arc<RwLock<WorkerState>>,
    event_tx: broadcast::Sender<WorkerEvent>,
    batches: Arc<dashmap::DashMap<BatchId, CancellationToken>>,
}

/// The background cache worker.
///
/// Owns the tile store and processes commands from the foreground manager.
/// Runs as a long-lived task; request handling and preload batches are
/// spawned so one slow fetch never blocks the command loop.
pub struct CacheWorker {
    shared: WorkerShared,
    command_rx: mpsc::Receiver<WorkerCommand>,
    next_batch: u64,
}

impl CacheWorker {
    /// Create a worker with its channels.
    ///
    /// # Arguments
    ///
    /// * `config` - Worker configuration
    /// * `store_config` - Initial tile store configuration
    /// * `fetcher` - Network fetch implementation
    /// * `metrics` - Shared hit/miss counters, sampled by the manager
    pub fn new(
        config: WorkerConfig,
        store_config: StoreConfig,
        fetcher: Arc<dyn TileFetcher>,
        metrics: Arc<PerformanceMetrics>,
    ) -> (Self, WorkerChannels) {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (event_tx, _) = broadcast::channel(config.event_capacity);

        let shared = WorkerShared {
            config: Arc::new(config),
            classifier: RequestClassifier::new(),
            store: Arc::new(Mutex::new(TileStore::new(store_config))),
            fetcher,
            metrics,
            state: Arc::new(RwLock::new(WorkerState::Installing)),
            event_tx: event_tx.clone(),
            batches: Arc::new(dashmap::DashMap::new()),
        };

        (
            Self {
                shared,
                command_rx,
                next_batch: 0,
            },
            WorkerChannels { command_tx, events: event_tx },
        )
    }

    /// Run the worker until the token is cancelled or all senders drop.
    ///
    /// Transitions `Installing → Controlling`, announces readiness, then
    /// processes commands.
    pub async fn run(mut self, shutdown: CancellationToken) {
        debug!("Cache worker installing");
        *self.shared.state.write() = WorkerState::Controlling;
        info!("Cache worker controlling, accepting commands");
        let _ = self.shared.event_tx.send(WorkerEvent::Ready);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        // Stop in-flight preload batches with the worker
        for entry in self.shared.batches.iter() {
            entry.value().cancel();
        }
        info!("Cache worker stopped");
    }

    fn handle(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Fetch { url, respond_to } => {
                let shared = self.shared.clone();
                tokio::spawn(async move {
                    let result = handle_fetch(&shared, &url).await;
                    let _ = respond_to.send(result);
                });
            }
            WorkerCommand::GetCacheInfo { respond_to } => {
                let _ = respond_to.send(Ok(self.shared.store.lock().info()));
            }
            WorkerCommand::ClearCache { scope, respond_to } => {
                self.shared.store.lock().clear(scope);
                let _ = respond_to.send(Ok(()));
            }
            WorkerCommand::UpdateConfig { patch, respond_to } => {
                self.shared.store.lock().update_config(patch);
                let _ = respond_to.send(Ok(()));
            }
            WorkerCommand::PreloadTiles {
                bounds,
                zoom_levels,
                respond_to,
            } => {
                let _ = respond_to.send(self.start_preload(bounds, zoom_levels));
            }
            WorkerCommand::CancelPreload { batch, respond_to } => {
                if let Some(entry) = self.shared.batches.get(&batch) {
                    debug!(%batch, "Cancelling preload batch");
                    entry.value().cancel();
                }
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    /// Validate a preload request and spawn its batch task.
    ///
    /// Rejected batches (bad zoom, bounds covering too many tiles) surface
    /// as [`WorkerError::InvalidPreload`] and leave the worker running.
    fn start_preload(
        &mut self,
        bounds: LatLngBounds,
        zoom_levels: Vec<u8>,
    ) -> Result<BatchId, WorkerError> {
        let mut tiles = Vec::new();
        for zoom in zoom_levels {
            tiles.extend(tiles_in_bounds(&bounds, zoom)?);
            if tiles.len() as u64 > MAX_ENUMERATED_TILES {
                return Err(CoordError::TooManyTiles {
                    tiles: tiles.len() as u64,
                    limit: MAX_ENUMERATED_TILES,
                }
                .into());
            }
        }

        self.next_batch += 1;
        let batch = BatchId(self.next_batch);
        let cancellation = CancellationToken::new();
        self.shared.batches.insert(batch, cancellation.clone());

        info!(%batch, tiles = tiles.len(), "Starting preload batch");
        let shared = self.shared.clone();
        tokio::spawn(run_preload(shared, batch, tiles, cancellation));

        Ok(batch)
    }
}

// =============================================================================
// Request handling
// =============================================================================

/// The per-request interception path.
///
/// Cacheable requests are served from the store when fresh; otherwise the
/// network response is returned and stored. Store write failures never
/// block serving the response.
async fn handle_fetch(shared: &WorkerShared, url: &str) -> Result<FetchResponse, WorkerError> {
    let controlling = *shared.state.read() == WorkerState::Controlling;
    let (key, class) = match shared.classifier.classify(url) {
        RequestClass::Tile(tile) if controlling => (tile_key(&tile), EntryClass::Tile),
        RequestClass::Static(key) if controlling => (key, EntryClass::Static),
        _ => {
            let body = shared.fetcher.fetch(url).await?;
            return Ok(FetchResponse {
                body,
                served: ServedFrom::Passthrough,
            });
        }
    };

    let start = Instant::now();
    if let GetOutcome::Hit(body) = shared.store.lock().get(&key) {
        shared.metrics.record_hit(start.elapsed());
        return Ok(FetchResponse {
            body,
            served: ServedFrom::Cache,
        });
    }

    match shared.fetcher.fetch(url).await {
        Ok(body) => {
            shared.metrics.record_miss(start.elapsed());
            let size = body.len() as u64;
            if let Err(e) = shared.store.lock().put(key.clone(), class, body.clone(), size) {
                // Non-fatal: serve the response, skip caching this entry
                warn!(error = %e, key = %key, "Cache put failed");
            }
            Ok(FetchResponse {
                body,
                served: ServedFrom::Network,
            })
        }
        Err(e) => {
            shared.metrics.record_miss(start.elapsed());
            Err(e.into())
        }
    }
}

// =============================================================================
// Preloading
// =============================================================================

/// Execute one preload batch.
///
/// Tiles already fresh in the store count as preloaded without a network
/// fetch; failed fetches are skipped and still counted so a single bad tile
/// never aborts the batch. Progress events are emitted from this single
/// driver so `preloaded` is monotonically non-decreasing.
async fn run_preload(
    shared: WorkerShared,
    batch: BatchId,
    tiles: Vec<TileCoord>,
    cancellation: CancellationToken,
) {
    let total = tiles.len();
    if total == 0 {
        let _ = shared.event_tx.send(WorkerEvent::PreloadProgress(PreloadProgress {
            batch,
            preloaded: 0,
            total: 0,
        }));
        shared.batches.remove(&batch);
        return;
    }

    let concurrency = shared.config.preload_concurrency.max(1);
    let mut completions = stream::iter(tiles)
        .map(|tile| {
            let shared = shared.clone();
            async move { preload_one(&shared, &tile).await }
        })
        .buffer_unordered(concurrency);

    let mut preloaded = 0;
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                debug!(%batch, preloaded, total, "Preload batch cancelled");
                break;
            }
            next = completions.next() => match next {
                Some(_) => {
                    preloaded += 1;
                    let _ = shared.event_tx.send(WorkerEvent::PreloadProgress(PreloadProgress {
                        batch,
                        preloaded,
                        total,
                    }));
                }
                None => break,
            },
        }
    }

    shared.batches.remove(&batch);
    if preloaded >= total {
        info!(%batch, total, "Preload batch complete");
    }
}

/// Process a single tile of a preload batch. Never fails; failures are
/// logged and the tile counts as processed.
async fn preload_one(shared: &WorkerShared, tile: &TileCoord) {
    let key = tile_key(tile);
    if shared.store.lock().contains_fresh(&key) {
        return;
    }

    let url = tile_url(&shared.config.tile_url_template, tile);
    match shared.fetcher.fetch(&url).await {
        Ok(body) => {
            let size = body.len() as u64;
            if let Err(e) = shared
                .store
                .lock()
                .put(key.clone(), EntryClass::Tile, body, size)
            {
                warn!(error = %e, key = %key, "Preload cache put failed");
            }
        }
        Err(e) => {
            debug!(error = %e, tile = %tile, "Preload tile fetch failed, skipping");
        }
    }
}
