//! Live map-view collaborator interface.
//!
//! The cache never renders anything; it only needs the current viewport and
//! zoom from whatever map widget the host application uses, plus a way to
//! hear when the view settles after a move or zoom. Host applications
//! implement [`MapView`] as a thin adapter over their map component.

use crate::coord::LatLngBounds;

/// Identifier for a registered settle listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SettleSubscription(pub u64);

/// Listener invoked when the map view settles.
pub type SettleListener = Box<dyn Fn() + Send + Sync>;

/// Minimal view of a live map widget.
///
/// "Settle" covers both move-end and zoom-end: the view stopped changing.
/// Implementations must tolerate `off_settle` with an unknown subscription
/// (treat it as a no-op).
pub trait MapView: Send + Sync {
    /// Current viewport bounds.
    fn bounds(&self) -> LatLngBounds;

    /// Current zoom level.
    fn zoom(&self) -> u8;

    /// Register a settle listener; returns a subscription used to detach.
    fn on_settle(&self, listener: SettleListener) -> SettleSubscription;

    /// Remove a previously registered settle listener.
    fn off_settle(&self, subscription: SettleSubscription);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Reference fake used to validate the contract shape.
    #[derive(Default)]
    struct FakeMap {
        listeners: Mutex<HashMap<u64, Arc<SettleListener>>>,
        next_id: Mutex<u64>,
    }

    impl FakeMap {
        fn settle(&self) {
            let listeners: Vec<_> = self.listeners.lock().values().cloned().collect();
            for listener in listeners {
                listener();
            }
        }
    }

    impl MapView for FakeMap {
        fn bounds(&self) -> LatLngBounds {
            LatLngBounds::new(48.0, 47.0, -121.0, -123.0).unwrap()
        }

        fn zoom(&self) -> u8 {
            12
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

    #[test]
    fn test_settle_listener_lifecycle() {
        let map = FakeMap::default();
        let fired = Arc::new(Mutex::new(0u32));

        let fired_in_listener = Arc::clone(&fired);
        let subscription = map.on_settle(Box::new(move || {
            *fired_in_listener.lock() += 1;
        }));

        map.settle();
        assert_eq!(*fired.lock(), 1);

        map.off_settle(subscription);
        map.settle();
        assert_eq!(*fired.lock(), 1);

        // Unknown subscription removal is a no-op
        map.off_settle(SettleSubscription(999));
    }
}
