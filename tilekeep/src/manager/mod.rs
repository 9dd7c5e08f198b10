//! Foreground cache manager.
//!
//! The [`CacheManager`] is the sole owner of the communication channel to
//! the background worker. It translates public API calls into worker
//! commands, applies a timeout to every round trip, and republishes worker
//! events to local subscribers.
//!
//! # Lifecycle
//!
//! Managers are explicitly constructed and injected; there is no global
//! instance. `init()` spawns the worker and event bridge; `dispose()` tears
//! both down. Tests create isolated managers freely.
//!
//! # Example
//!
//! ```ignore
//! use tilekeep::manager::{CacheManager, CacheManagerConfig};
//! use tilekeep::worker::HttpTileFetcher;
//!
//! let manager = Arc::new(CacheManager::new(CacheManagerConfig::default()));
//! manager.init(Arc::new(HttpTileFetcher::new()?));
//!
//! manager.on(EventKind::PreloadProgress, |event| { /* update UI */ });
//! let batch = manager.preload_tiles(bounds, vec![11, 12, 13]).await?;
//! ```

mod error;
mod events;
mod smart;
mod statistics;

pub use error::CacheManagerError;
pub use events::{CacheEvent, EventBus, EventKind, ListenerId};
pub use smart::{SmartPreloadGuard, SmartPreloadOptions};
pub use statistics::{format_size, CacheStatistics};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::coord::{LatLngBounds, MAX_ZOOM, MIN_ZOOM};
use crate::map::MapView;
use crate::store::{CacheInfo, ClearScope, ConfigPatch, StoreConfig};
use crate::telemetry::{PerformanceMetrics, PerformanceReport};
use crate::worker::{
    BatchId, CacheWorker, TileFetcher, TileGateway, WorkerCommand, WorkerConfig, WorkerError,
    WorkerEvent,
};

/// Default timeout for one manager ↔ worker round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between performance-update events.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for the cache manager and the worker it owns.
#[derive(Clone, Debug)]
pub struct CacheManagerConfig {
    /// Initial tile store configuration.
    pub store: StoreConfig,

    /// Worker configuration.
    pub worker: WorkerConfig,

    /// Timeout applied to every command round trip. Bounds the suspension
    /// of callers when the worker never responds.
    pub request_timeout: Duration,

    /// Interval between performance-update events while monitoring.
    pub report_interval: Duration,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            worker: WorkerConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

/// Channel state created by `init()` and destroyed by `dispose()`.
struct ManagerRuntime {
    command_tx: mpsc::Sender<WorkerCommand>,
    shutdown: CancellationToken,
}

/// Handle returned by [`CacheManager::start_performance_monitoring`].
///
/// A handle from a redundant start carries no token and stopping it does
/// nothing; the original monitor keeps running.
pub struct PerformanceMonitorHandle {
    token: Option<CancellationToken>,
}

impl PerformanceMonitorHandle {
    /// Stop the monitor this handle owns.
    pub fn stop(self) {
        if let Some(token) = self.token {
            token.cancel();
        }
    }
}

/// Foreground coordinator for the tile cache.
pub struct CacheManager {
    config: CacheManagerConfig,
    events: Arc<EventBus>,
    metrics: Arc<PerformanceMetrics>,
    ready: Arc<AtomicBool>,
    runtime: Mutex<Option<ManagerRuntime>>,
    init_count: AtomicU64,
    monitor: Mutex<Option<CancellationToken>>,
}

impl CacheManager {
    /// Create an uninitialized manager. Call [`init`](Self::init) before
    /// issuing operations.
    pub fn new(config: CacheManagerConfig) -> Self {
        Self {
            config,
            events: Arc::new(EventBus::new()),
            metrics: Arc::new(PerformanceMetrics::new()),
            ready: Arc::new(AtomicBool::new(false)),
            runtime: Mutex::new(None),
            init_count: AtomicU64::new(0),
            monitor: Mutex::new(None),
        }
    }

    /// Spawn the background worker and event bridge.
    ///
    /// Idempotent: calling on an already-initialized manager does nothing.
    /// After a `dispose()` / `init()` cycle, `worker-updated` is emitted
    /// alongside `worker-ready` so subscribers know a new worker took over.
    pub fn init(&self, fetcher: Arc<dyn TileFetcher>) {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            return;
        }

        let generation = self.init_count.fetch_add(1, Ordering::SeqCst) + 1;
        let (worker, channels) = CacheWorker::new(
            self.config.worker.clone(),
            self.config.store,
            fetcher,
            Arc::clone(&self.metrics),
        );
        let shutdown = CancellationToken::new();

        // Subscribe before the worker runs so the ready signal is not missed
        let mut worker_events = channels.events.subscribe();
        let events = Arc::clone(&self.events);
        let ready = Arc::clone(&self.ready);
        let bridge_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = bridge_shutdown.cancelled() => break,
                    event = worker_events.recv() => match event {
                        Ok(WorkerEvent::Ready) => {
                            ready.store(true, Ordering::SeqCst);
                            events.emit(&CacheEvent::WorkerReady);
                            if generation > 1 {
                                events.emit(&CacheEvent::WorkerUpdated);
                            }
                        }
                        Ok(WorkerEvent::PreloadProgress(progress)) => {
                            events.emit(&CacheEvent::PreloadProgress(progress));
                        }
                        // Slow listeners may lag behind; skip and continue
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        tokio::spawn(worker.run(shutdown.clone()));
        info!(generation, "Cache manager initialized");

        *runtime = Some(ManagerRuntime {
            command_tx: channels.command_tx,
            shutdown,
        });
    }

    /// Tear down the worker, event bridge, and performance monitor.
    pub fn dispose(&self) {
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown.cancel();
        }
        if let Some(token) = self.monitor.lock().take() {
            token.cancel();
        }
        self.ready.store(false, Ordering::SeqCst);
        info!("Cache manager disposed");
    }

    /// True once the worker has reached `Controlling` and signalled ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Worker operations
    // =========================================================================

    /// Snapshot store counts, sizes, and configuration.
    pub async fn get_cache_info(&self) -> Result<CacheInfo, CacheManagerError> {
        self.request(|respond_to| WorkerCommand::GetCacheInfo { respond_to })
            .await
    }

    /// Clear the given scope. Emits `cache-cleared` on success.
    pub async fn clear_cache(&self, scope: ClearScope) -> Result<(), CacheManagerError> {
        self.request(|respond_to| WorkerCommand::ClearCache { scope, respond_to })
            .await?;
        self.events.emit(&CacheEvent::CacheCleared(scope));
        Ok(())
    }

    /// Start a preload batch covering `bounds` at each listed zoom level.
    ///
    /// Resolves once the worker accepts the batch; completion is observed
    /// via `preload-progress` events reaching `preloaded >= total`.
    pub async fn preload_tiles(
        &self,
        bounds: LatLngBounds,
        zoom_levels: Vec<u8>,
    ) -> Result<BatchId, CacheManagerError> {
        self.request(|respond_to| WorkerCommand::PreloadTiles {
            bounds,
            zoom_levels,
            respond_to,
        })
        .await
    }

    /// Stop the remaining fetches of a preload batch.
    pub async fn cancel_preload(&self, batch: BatchId) -> Result<(), CacheManagerError> {
        self.request(|respond_to| WorkerCommand::CancelPreload { batch, respond_to })
            .await
    }

    /// Preload the map's current viewport at the current zoom ± range.
    ///
    /// Zoom levels are clamped to the supported [1, 18] range.
    pub async fn preload_current_viewport(
        &self,
        map: &dyn MapView,
        additional_zoom_range: u8,
    ) -> Result<BatchId, CacheManagerError> {
        let bounds = map.bounds();
        let zoom = map.zoom();
        let low = zoom.saturating_sub(additional_zoom_range).max(MIN_ZOOM);
        let high = zoom.saturating_add(additional_zoom_range).min(MAX_ZOOM);
        let zoom_levels: Vec<u8> = (low..=high).collect();
        debug!(?bounds, ?zoom_levels, "Preloading current viewport");
        self.preload_tiles(bounds, zoom_levels).await
    }

    /// Merge a partial configuration update. Emits `config-updated` on
    /// success.
    pub async fn update_config(&self, patch: ConfigPatch) -> Result<(), CacheManagerError> {
        self.request(|respond_to| WorkerCommand::UpdateConfig { patch, respond_to })
            .await?;
        self.events.emit(&CacheEvent::ConfigUpdated(patch));
        Ok(())
    }

    /// Human-readable size and usage strings derived from
    /// [`get_cache_info`](Self::get_cache_info).
    pub async fn get_cache_statistics(&self) -> Result<CacheStatistics, CacheManagerError> {
        Ok(CacheStatistics::from_info(&self.get_cache_info().await?))
    }

    /// Gateway for routing map-layer HTTP requests through the worker.
    pub fn fetch_gateway(&self) -> Result<TileGateway, CacheManagerError> {
        self.runtime
            .lock()
            .as_ref()
            .map(|runtime| TileGateway::new(runtime.command_tx.clone()))
            .ok_or(CacheManagerError::NotReady)
    }

    // =========================================================================
    // Events and monitoring
    // =========================================================================

    /// Register a listener for one event kind.
    pub fn on(
        &self,
        kind: EventKind,
        listener: impl Fn(&CacheEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.on(kind, listener)
    }

    /// Remove a listener. Unknown ids are a no-op.
    pub fn off(&self, kind: EventKind, id: ListenerId) {
        self.events.off(kind, id);
    }

    /// Latest performance counters, if any requests have been observed.
    pub fn performance_report(&self) -> Option<PerformanceReport> {
        self.metrics.report()
    }

    /// Start emitting periodic `performance-update` events.
    ///
    /// Idempotent: while a monitor is active, further calls are no-ops and
    /// return an inert handle.
    pub fn start_performance_monitoring(&self) -> PerformanceMonitorHandle {
        let mut monitor = self.monitor.lock();
        if monitor.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return PerformanceMonitorHandle { token: None };
        }

        let token = CancellationToken::new();
        *monitor = Some(token.clone());

        let metrics = Arc::clone(&self.metrics);
        let events = Arc::clone(&self.events);
        let interval = self.config.report_interval;
        let task_token = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the immediate first tick
            ticker.tick().await;
            let mut last_total = 0;
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Some(report) = metrics.report() {
                            if report.total_requests != last_total {
                                last_total = report.total_requests;
                                events.emit(&CacheEvent::PerformanceUpdate(report));
                            }
                        }
                    }
                }
            }
        });

        PerformanceMonitorHandle { token: Some(token) }
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    /// Issue one command and await its response under the request timeout.
    ///
    /// Rejects with `NotReady` before the worker is controlling, with
    /// `ChannelUnavailable` when the channel is closed, and with `TimedOut`
    /// when no response arrives in time.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, WorkerError>>) -> WorkerCommand,
    ) -> Result<T, CacheManagerError> {
        if !self.is_ready() {
            return Err(CacheManagerError::NotReady);
        }
        let command_tx = self
            .runtime
            .lock()
            .as_ref()
            .map(|runtime| runtime.command_tx.clone())
            .ok_or(CacheManagerError::ChannelUnavailable)?;

        let (respond_to, response) = oneshot::channel();
        command_tx
            .send(build(respond_to))
            .await
            .map_err(|_| CacheManagerError::ChannelUnavailable)?;

        match tokio::time::timeout(self.config.request_timeout, response).await {
            Err(_) => Err(CacheManagerError::TimedOut),
            Ok(Err(_)) => Err(CacheManagerError::ChannelUnavailable),
            Ok(Ok(result)) => result.map_err(CacheManagerError::from),
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown.cancel();
        }
        if let Some(token) = self.monitor.lock().take() {
            token.cancel();
        }
    }
}
