//! Lifecycle event fan-out to application subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::store::{ClearScope, ConfigPatch};
use crate::telemetry::PerformanceReport;
use crate::worker::PreloadProgress;

/// Events re-emitted by the cache manager to local subscribers.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// The worker reached `Controlling` and commands are accepted.
    WorkerReady,
    /// A re-initialized worker took over from a previous one.
    WorkerUpdated,
    /// Preload batch progress.
    PreloadProgress(PreloadProgress),
    /// Periodic performance sample.
    PerformanceUpdate(PerformanceReport),
    /// A clear completed for the given scope.
    CacheCleared(ClearScope),
    /// A configuration update was applied.
    ConfigUpdated(ConfigPatch),
}

impl CacheEvent {
    /// The registry key this event dispatches under.
    pub fn kind(&self) -> EventKind {
        match self {
            CacheEvent::WorkerReady => EventKind::WorkerReady,
            CacheEvent::WorkerUpdated => EventKind::WorkerUpdated,
            CacheEvent::PreloadProgress(_) => EventKind::PreloadProgress,
            CacheEvent::PerformanceUpdate(_) => EventKind::PerformanceUpdate,
            CacheEvent::CacheCleared(_) => EventKind::CacheCleared,
            CacheEvent::ConfigUpdated(_) => EventKind::ConfigUpdated,
        }
    }
}

/// Subscribable event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    WorkerReady,
    WorkerUpdated,
    PreloadProgress,
    PerformanceUpdate,
    CacheCleared,
    ConfigUpdated,
}

/// Identifier of one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Listener registry with multiple listeners per event kind.
///
/// Listeners run synchronously on the emitting task; they are expected to be
/// cheap (push into a channel, update UI state). Removing a listener that is
/// not registered is a no-op.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_id: RwLock<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind.
    pub fn on(&self, kind: EventKind, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) -> ListenerId {
        let id = {
            let mut next = self.next_id.write();
            *next += 1;
            ListenerId(*next)
        };
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn off(&self, kind: EventKind, id: ListenerId) {
        if let Some(registered) = self.listeners.write().get_mut(&kind) {
            registered.retain(|(registered_id, _)| *registered_id != id);
        }
    }

    /// Dispatch an event to every listener registered for its kind.
    pub fn emit(&self, event: &CacheEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .get(&event.kind())
            .map(|registered| registered.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in listeners {
            listener(event);
        }
    }

    /// Number of listeners currently registered for a kind.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .get(&kind)
            .map(|registered| registered.len())
            .unwrap_or(0)
    }
}
