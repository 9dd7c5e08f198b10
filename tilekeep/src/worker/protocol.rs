//! Message types for the manager ↔ worker channel.
//!
//! Commands flow over an `mpsc` channel; each command carries its own
//! `oneshot` responder so responses never cross-deliver between concurrent
//! calls. Unsolicited worker → manager notifications (readiness, preload
//! progress) flow over a separate `broadcast` channel.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::coord::{CoordError, LatLngBounds};
use crate::store::{CacheInfo, ClearScope, ConfigPatch};

/// Identifier of one preload batch.
///
/// Returned on batch acceptance and used both to correlate progress events
/// and to cancel the batch's remaining fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// Running progress of a preload batch.
///
/// `preloaded` is monotonically non-decreasing and never exceeds `total`;
/// the final event of a completed batch has `preloaded == total`. Tiles
/// whose fetch failed still count as processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadProgress {
    pub batch: BatchId,
    pub preloaded: usize,
    pub total: usize,
}

impl PreloadProgress {
    /// True once every tile in the batch has been processed.
    pub fn is_complete(&self) -> bool {
        self.preloaded >= self.total
    }
}

/// Worker lifecycle state.
///
/// Fetch interception is gated on `Controlling`; until the worker's command
/// loop runs, requests pass through to the network uncached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Controlling,
}

/// Where a fetched response was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    /// Fresh entry in the store; no network call occurred.
    Cache,
    /// Fetched from network (store miss or stale entry).
    Network,
    /// Request did not match a cacheable pattern, or the worker is not yet
    /// controlling; forwarded to network uncached.
    Passthrough,
}

/// A response from the worker's fetch path.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub body: Bytes,
    pub served: ServedFrom,
}

/// Application-level errors reported by the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Structural store failure (e.g. entry over byte budget).
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// Malformed preload payload (bad bounds or zoom level).
    #[error("Invalid preload request: {0}")]
    InvalidPreload(#[from] CoordError),

    /// Network fetch failed.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] super::fetch::FetchError),

    /// The worker is not running or its channel is closed.
    #[error("Worker unavailable")]
    Unavailable,
}

/// Commands accepted by the worker, each answered over its own responder.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Fetch a URL through the interception path.
    Fetch {
        url: String,
        respond_to: oneshot::Sender<Result<FetchResponse, WorkerError>>,
    },

    /// Snapshot store counts, sizes, and configuration.
    GetCacheInfo {
        respond_to: oneshot::Sender<Result<CacheInfo, WorkerError>>,
    },

    /// Remove all entries in the given scope.
    ClearCache {
        scope: ClearScope,
        respond_to: oneshot::Sender<Result<(), WorkerError>>,
    },

    /// Start a preload batch; acknowledged on acceptance, progress follows
    /// out-of-band as [`WorkerEvent::PreloadProgress`].
    PreloadTiles {
        bounds: LatLngBounds,
        zoom_levels: Vec<u8>,
        respond_to: oneshot::Sender<Result<BatchId, WorkerError>>,
    },

    /// Stop the remaining fetches of a batch. Unknown or already-finished
    /// batches acknowledge without effect.
    CancelPreload {
        batch: BatchId,
        respond_to: oneshot::Sender<Result<(), WorkerError>>,
    },

    /// Merge a partial configuration update into the store.
    UpdateConfig {
        patch: ConfigPatch,
        respond_to: oneshot::Sender<Result<(), WorkerError>>,
    },
}

/// Unsolicited worker → manager notifications.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// The worker reached `Controlling` and accepts commands.
    Ready,
    /// Preload batch progress; delivered any number of times per batch.
    PreloadProgress(PreloadProgress),
}
