//! Adaptive cache strategy controller.
//!
//! Periodically tunes the store configuration from observed usage and
//! triggers cleanup when usage crosses thresholds, without user
//! intervention. Two independent timers run under one cancellation token:
//!
//! - **Optimization** (default every 30 minutes): scales `max_tiles` with
//!   slot utilization and `max_age` with the observed hit rate, both
//!   clamped to absolute ranges. Changes below a minimum relative delta are
//!   dropped so noise never causes config thrash.
//! - **Cleanup** (default every 6 hours, when auto-cleanup is enabled):
//!   clears the tile class when its size exceeds the byte budget or its
//!   count exceeds `max_tiles` (possible after a shrinking config update,
//!   which never evicts retroactively).
//!
//! Both timers skip their tick silently when statistics cannot be read
//! (worker not ready); the next tick retries. All activity here is
//! background housekeeping and is never surfaced to the user.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::manager::CacheManager;
use crate::store::{CacheInfo, ClearScope, ConfigPatch};

/// Tuning for the adaptive controller.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveConfig {
    /// Interval between optimization passes.
    pub optimization_interval: Duration,

    /// Interval between cleanup passes.
    pub cleanup_interval: Duration,

    /// Whether the scheduled cleanup timer runs at all. The manual
    /// [`AdaptiveController::optimize_now`] path always includes cleanup.
    pub auto_cleanup: bool,

    /// Minimum relative change required before a new value is applied.
    pub min_change_ratio: f64,

    /// Absolute clamp range for `max_tiles`.
    pub tiles_floor: usize,
    pub tiles_ceiling: usize,

    /// Absolute clamp range for `max_age`.
    pub age_floor: Duration,
    pub age_ceiling: Duration,

    /// Utilization thresholds for scaling `max_tiles`.
    pub high_utilization: f64,
    pub low_utilization: f64,

    /// Hit-rate thresholds for scaling `max_age`.
    pub high_hit_rate: f64,
    pub low_hit_rate: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            optimization_interval: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(6 * 60 * 60),
            auto_cleanup: true,
            min_change_ratio: 0.10,
            tiles_floor: 200,
            tiles_ceiling: 4000,
            age_floor: Duration::from_secs(60 * 60),
            age_ceiling: Duration::from_secs(30 * 24 * 60 * 60),
            high_utilization: 0.9,
            low_utilization: 0.3,
            high_hit_rate: 0.8,
            low_hit_rate: 0.4,
        }
    }
}

/// Growth and shrink factors for `max_tiles`.
const TILES_GROW: f64 = 1.3;
const TILES_SHRINK: f64 = 0.7;

/// Growth and shrink factors for `max_age`.
const AGE_GROW: f64 = 1.25;
const AGE_SHRINK: f64 = 0.75;

/// Candidate `max_tiles` from slot utilization, or `None` when the change
/// would be below the thrash threshold.
fn plan_max_tiles(info: &CacheInfo, config: &AdaptiveConfig) -> Option<usize> {
    let current = info.config.max_tiles;
    if current == 0 {
        return None;
    }
    let utilization = info.tiles.count as f64 / current as f64;

    let candidate = if utilization > config.high_utilization {
        (current as f64 * TILES_GROW) as usize
    } else if utilization < config.low_utilization {
        (current as f64 * TILES_SHRINK) as usize
    } else {
        return None;
    };
    let candidate = candidate.clamp(config.tiles_floor, config.tiles_ceiling);

    let delta = (candidate as f64 - current as f64).abs() / current as f64;
    (delta >= config.min_change_ratio).then_some(candidate)
}

/// Candidate `max_age` from the hit rate, or `None` when the hit rate is in
/// the neutral band or the change is below the thrash threshold.
fn plan_max_age(info: &CacheInfo, hit_rate: f64, config: &AdaptiveConfig) -> Option<Duration> {
    let current = info.config.max_age;
    let factor = if hit_rate > config.high_hit_rate {
        AGE_GROW
    } else if hit_rate < config.low_hit_rate {
        AGE_SHRINK
    } else {
        return None;
    };

    let candidate = current.mul_f64(factor).clamp(config.age_floor, config.age_ceiling);

    let delta = (candidate.as_secs_f64() - current.as_secs_f64()).abs() / current.as_secs_f64();
    (delta >= config.min_change_ratio).then_some(candidate)
}

/// Whether the tile class warrants an automatic clear.
fn needs_cleanup(info: &CacheInfo) -> bool {
    info.tiles.estimated_size > info.config.max_size_bytes
        || info.tiles.count > info.config.max_tiles
}

/// Periodic tuner for the tile cache.
pub struct AdaptiveController {
    manager: Arc<CacheManager>,
    config: AdaptiveConfig,
    shutdown: Mutex<Option<CancellationToken>>,
    last_cleanup: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl AdaptiveController {
    pub fn new(manager: Arc<CacheManager>, config: AdaptiveConfig) -> Self {
        Self {
            manager,
            config,
            shutdown: Mutex::new(None),
            last_cleanup: Arc::new(Mutex::new(None)),
        }
    }

    /// Start both timers. Idempotent while running.
    pub fn start(&self) {
        let mut shutdown = self.shutdown.lock();
        if shutdown.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return;
        }
        let token = CancellationToken::new();
        *shutdown = Some(token.clone());

        let manager = Arc::clone(&self.manager);
        let config = self.config;
        let optimize_token = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.optimization_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = optimize_token.cancelled() => break,
                    _ = ticker.tick() => optimize_once(&manager, &config).await,
                }
            }
        });

        if self.config.auto_cleanup {
            let manager = Arc::clone(&self.manager);
            let config = self.config;
            let last_cleanup = Arc::clone(&self.last_cleanup);
            let cleanup_token = token;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(config.cleanup_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cleanup_token.cancelled() => break,
                        _ = ticker.tick() => cleanup_once(&manager, &last_cleanup).await,
                    }
                }
            });
        }

        info!("Adaptive controller started");
    }

    /// Cancel both timers; no tick fires afterwards.
    pub fn stop(&self) {
        if let Some(token) = self.shutdown.lock().take() {
            token.cancel();
        }
        debug!("Adaptive controller stopped");
    }

    /// Run the optimization and cleanup logic once, independent of the
    /// timers.
    pub async fn optimize_now(&self) {
        optimize_once(&self.manager, &self.config).await;
        cleanup_once(&self.manager, &self.last_cleanup).await;
    }

    /// When the last automatic cleanup ran, if ever.
    pub fn last_cleanup(&self) -> Option<DateTime<Utc>> {
        *self.last_cleanup.lock()
    }
}

impl Drop for AdaptiveController {
    fn drop(&mut self) {
        if let Some(token) = self.shutdown.lock().take() {
            token.cancel();
        }
    }
}

/// One optimization pass. Skips silently when statistics are unavailable.
async fn optimize_once(manager: &CacheManager, config: &AdaptiveConfig) {
    let info = match manager.get_cache_info().await {
        Ok(info) => info,
        Err(e) => {
            debug!(error = %e, "Optimization tick skipped");
            return;
        }
    };

    let patch = ConfigPatch {
        max_tiles: plan_max_tiles(&info, config),
        max_age: manager
            .performance_report()
            .and_then(|report| plan_max_age(&info, report.cache_hit_rate, config)),
        max_size_bytes: None,
    };
    if patch.is_empty() {
        return;
    }

    match manager.update_config(patch).await {
        Ok(()) => info!(?patch, "Adaptive optimization applied"),
        Err(e) => debug!(error = %e, "Adaptive optimization skipped"),
    }
}

/// One cleanup pass. Skips silently when statistics are unavailable.
async fn cleanup_once(manager: &CacheManager, last_cleanup: &Mutex<Option<DateTime<Utc>>>) {
    let info = match manager.get_cache_info().await {
        Ok(info) => info,
        Err(e) => {
            debug!(error = %e, "Cleanup tick skipped");
            return;
        }
    };
    if !needs_cleanup(&info) {
        return;
    }

    match manager.clear_cache(ClearScope::Tiles).await {
        Ok(()) => {
            *last_cleanup.lock() = Some(Utc::now());
            info!(
                tiles = info.tiles.count,
                size = info.tiles.estimated_size,
                "Automatic cache cleanup"
            );
        }
        Err(e) => debug!(error = %e, "Automatic cleanup failed"),
    }
}
