//! Manager error taxonomy.
//!
//! Callers can tell channel problems (not ready, closed, timed out) apart
//! from errors the worker itself reported. The manager never retries on its
//! own; retry is a caller decision.

use thiserror::Error;

use crate::worker::WorkerError;

/// Errors surfaced by cache manager operations.
#[derive(Debug, Error)]
pub enum CacheManagerError {
    /// The worker has not reached `Controlling` (or the manager was never
    /// initialized). Check `is_ready()` before issuing operations.
    #[error("Cache manager not ready")]
    NotReady,

    /// The command channel is closed or the worker task is gone.
    #[error("Worker channel unavailable")]
    ChannelUnavailable,

    /// No response arrived within the configured request timeout.
    #[error("Worker request timed out")]
    TimedOut,

    /// The worker reported an application-level error.
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl CacheManagerError {
    /// True for channel-level failures a UI may silently retry or ignore;
    /// false for worker-reported errors that should be surfaced to the user.
    pub fn is_channel_error(&self) -> bool {
        matches!(
            self,
            CacheManagerError::NotReady
                | CacheManagerError::ChannelUnavailable
                | CacheManagerError::TimedOut
        )
    }
}
