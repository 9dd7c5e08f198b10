//! Smart preloading: automatic, debounced viewport preloads.
//!
//! Attaches a settle listener to the live map view. Each settle restarts a
//! debounce delay; once the view holds still for the full delay, the
//! current viewport is preloaded if the zoom is within the ceiling and the
//! viewport moved materially since the last automatic preload.
//!
//! Smart preloads are background housekeeping: failures are logged at debug
//! level and never surfaced to the user.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::coord::LatLngBounds;
use crate::map::{MapView, SettleSubscription};

use super::CacheManager;

/// Tuning for smart preloading.
#[derive(Debug, Clone, Copy)]
pub struct SmartPreloadOptions {
    /// Quiet period after the last settle before preloading starts.
    pub debounce: Duration,

    /// No automatic preloads above this zoom level.
    pub max_zoom: u8,

    /// Zoom range around the current level passed to the viewport preload.
    pub zoom_range: u8,

    /// Minimum viewport-center shift that counts as a material move, as a
    /// fraction of the viewport's smaller span.
    pub min_center_shift: f64,
}

impl Default for SmartPreloadOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1500),
            max_zoom: 16,
            zoom_range: 1,
            min_center_shift: 0.25,
        }
    }
}

/// Detach handle for smart preloading.
///
/// Detaching (or dropping) removes the map listener and cancels any pending
/// debounce timer; no preload fires afterwards.
pub struct SmartPreloadGuard {
    map: Arc<dyn MapView>,
    subscription: Option<SettleSubscription>,
    token: CancellationToken,
}

impl SmartPreloadGuard {
    /// Remove the listener and stop the debounce task.
    pub fn detach(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.map.off_settle(subscription);
            self.token.cancel();
        }
    }
}

impl Drop for SmartPreloadGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Viewport state recorded after each automatic preload.
#[derive(Debug, Clone, Copy)]
struct LastPreload {
    center: (f64, f64),
    zoom: u8,
}

/// Whether the view moved enough to justify another preload.
fn moved_materially(
    last: Option<LastPreload>,
    bounds: &LatLngBounds,
    zoom: u8,
    min_center_shift: f64,
) -> bool {
    let Some(last) = last else {
        return true;
    };
    if last.zoom != zoom {
        return true;
    }
    let (lat, lon) = bounds.center();
    let shift = (lat - last.center.0).abs().max((lon - last.center.1).abs());
    shift >= min_center_shift * bounds.min_span()
}

impl CacheManager {
    /// Attach settle listeners to the map and preload on debounced settles.
    ///
    /// Returns a guard that must be detached (or dropped) to remove the
    /// listener and cancel any pending debounce.
    pub fn enable_smart_preloading(
        self: &Arc<Self>,
        map: Arc<dyn MapView>,
        options: SmartPreloadOptions,
    ) -> SmartPreloadGuard {
        let (settle_tx, mut settle_rx) = mpsc::unbounded_channel();
        let subscription = map.on_settle(Box::new(move || {
            let _ = settle_tx.send(());
        }));

        let token = CancellationToken::new();
        let task_token = token.clone();
        let manager = Arc::clone(self);
        let task_map = Arc::clone(&map);
        tokio::spawn(async move {
            let mut last: Option<LastPreload> = None;
            'outer: loop {
                // Wait for the first settle
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    signal = settle_rx.recv() => {
                        if signal.is_none() {
                            break;
                        }
                    }
                }

                // Debounce: each further settle restarts the delay
                loop {
                    tokio::select! {
                        _ = task_token.cancelled() => break 'outer,
                        _ = tokio::time::sleep(options.debounce) => break,
                        signal = settle_rx.recv() => {
                            if signal.is_none() {
                                break 'outer;
                            }
                        }
                    }
                }

                let zoom = task_map.zoom();
                if zoom > options.max_zoom {
                    debug!(zoom, ceiling = options.max_zoom, "Smart preload skipped: zoom above ceiling");
                    continue;
                }
                let bounds = task_map.bounds();
                if !moved_materially(last, &bounds, zoom, options.min_center_shift) {
                    debug!("Smart preload skipped: viewport unchanged");
                    continue;
                }

                match manager
                    .preload_current_viewport(&*task_map, options.zoom_range)
                    .await
                {
                    Ok(batch) => {
                        debug!(%batch, "Smart preload started");
                        last = Some(LastPreload {
                            center: bounds.center(),
                            zoom,
                        });
                    }
                    // Best-effort housekeeping: silent on failure
                    Err(e) => debug!(error = %e, "Smart preload skipped"),
                }
            }
        });

        SmartPreloadGuard {
            map,
            subscription: Some(subscription),
            token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{CacheEvent, CacheManagerConfig, EventKind};
    use crate::map::SettleListener;
    use crate::worker::fetch::tests::MockTileFetcher;
    use crate::worker::BatchId;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::oneshot;

    struct FakeMap {
        bounds: Mutex<LatLngBounds>,
        zoom: Mutex<u8>,
        listeners: Mutex<HashMap<u64, Arc<SettleListener>>>,
        next_id: Mutex<u64>,
    }

    impl FakeMap {
        fn new(zoom: u8) -> Self {
            Self {
                bounds: Mutex::new(LatLngBounds::new(47.7, 47.5, -122.2, -122.4).unwrap()),
                zoom: Mutex::new(zoom),
                listeners: Mutex::new(HashMap::new()),
                next_id: Mutex::new(0),
            }
        }

        fn settle(&self) {
            let listeners: Vec<_> = self.listeners.lock().values().cloned().collect();
            for listener in listeners {
                listener();
            }
        }

        fn pan_to(&self, north: f64, south: f64, east: f64, west: f64) {
            *self.bounds.lock() = LatLngBounds::new(north, south, east, west).unwrap();
        }

        fn listener_count(&self) -> usize {
            self.listeners.lock().len()
        }
    }

    impl MapView for FakeMap {
        fn bounds(&self) -> LatLngBounds {
            *self.bounds.lock()
        }

        fn zoom(&self) -> u8 {
            *self.zoom.lock()
        }

        fn on_settle(&self, listener: SettleListener) -> SettleSubscription {
            let mut next = self.next_id.lock();
            *next += 1;
            self.listeners.lock().insert(*next, Arc::new(listener));
            SettleSubscription(*next)
        }

        fn off_settle(&self, subscription: SettleSubscription) {
            self.listeners.lock().remove(&subscription.0);
        }
    }

    fn test_options() -> SmartPreloadOptions {
        SmartPreloadOptions {
            debounce: Duration::from_millis(50),
            ..SmartPreloadOptions::default()
        }
    }

    async fn ready_manager() -> Arc<CacheManager> {
        let manager = Arc::new(CacheManager::new(CacheManagerConfig::default()));
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        manager.on(EventKind::WorkerReady, move |_| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(());
            }
        });
        manager.init(Arc::new(MockTileFetcher::ok(b"tile")));
        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        manager
    }

    /// Collects distinct preload batch ids seen in progress events.
    fn track_batches(manager: &CacheManager) -> Arc<Mutex<HashSet<BatchId>>> {
        let batches = Arc::new(Mutex::new(HashSet::new()));
        let batches_in_listener = Arc::clone(&batches);
        manager.on(EventKind::PreloadProgress, move |event| {
            if let CacheEvent::PreloadProgress(progress) = event {
                batches_in_listener.lock().insert(progress.batch);
            }
        });
        batches
    }

    #[tokio::test]
    async fn test_rapid_settles_collapse_into_one_preload() {
        let manager = ready_manager().await;
        let map = Arc::new(FakeMap::new(12));
        let batches = track_batches(&manager);

        let guard = manager.enable_smart_preloading(map.clone(), test_options());
        for _ in 0..5 {
            map.settle();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(batches.lock().len(), 1);
        guard.detach();
        manager.dispose();
    }

    #[tokio::test]
    async fn test_no_preload_above_zoom_ceiling() {
        let manager = ready_manager().await;
        let map = Arc::new(FakeMap::new(17));
        let batches = track_batches(&manager);

        let guard = manager.enable_smart_preloading(map.clone(), test_options());
        map.settle();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(batches.lock().is_empty());
        guard.detach();
        manager.dispose();
    }

    #[tokio::test]
    async fn test_unmoved_viewport_preloads_once() {
        let manager = ready_manager().await;
        let map = Arc::new(FakeMap::new(12));
        let batches = track_batches(&manager);

        let guard = manager.enable_smart_preloading(map.clone(), test_options());
        map.settle();
        tokio::time::sleep(Duration::from_millis(200)).await;
        // Settle again without moving: no second batch
        map.settle();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(batches.lock().len(), 1);

        // A material pan triggers another batch
        map.pan_to(48.7, 48.5, -121.2, -121.4);
        map.settle();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(batches.lock().len(), 2);

        guard.detach();
        manager.dispose();
    }

    #[tokio::test]
    async fn test_detach_removes_listener_and_pending_debounce() {
        let manager = ready_manager().await;
        let map = Arc::new(FakeMap::new(12));
        let batches = track_batches(&manager);

        let guard = manager.enable_smart_preloading(map.clone(), test_options());
        assert_eq!(map.listener_count(), 1);

        // Settle then detach inside the debounce window
        map.settle();
        guard.detach();
        assert_eq!(map.listener_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(batches.lock().is_empty(), "debounced preload fired after detach");
        manager.dispose();
    }

    #[test]
    fn test_moved_materially_rules() {
        let bounds = LatLngBounds::new(47.7, 47.5, -122.2, -122.4).unwrap();

        // First preload always counts as moved
        assert!(moved_materially(None, &bounds, 12, 0.25));

        let last = LastPreload {
            center: bounds.center(),
            zoom: 12,
        };
        // Identical viewport: not material
        assert!(!moved_materially(Some(last), &bounds, 12, 0.25));
        // Zoom change: material
        assert!(moved_materially(Some(last), &bounds, 13, 0.25));

        // Shift beyond a quarter of the span: material
        let panned = LatLngBounds::new(47.8, 47.6, -122.1, -122.3).unwrap();
        assert!(moved_materially(Some(last), &panned, 12, 0.25));
    }
}
