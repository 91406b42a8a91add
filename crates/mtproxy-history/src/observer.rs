//! The `Observer` capability the connection state machine invokes at its
//! byte-level hook points: a redesign away from a transparent
//! socket-wrapping decorator (`log_handler.py`'s `LoggingSocketDecorator`)
//! toward an explicit interface.

use std::sync::{Arc, Mutex};

use crate::tracker::Tracker;

pub trait Observer: Send + Sync {
    fn on_client_bytes(&self, data: &[u8]);
    fn on_server_bytes(&self, data: &[u8]);
}

/// Used when `--with-history` is off: no allocation, no locking.
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_client_bytes(&self, _data: &[u8]) {}
    fn on_server_bytes(&self, _data: &[u8]) {}
}

/// Feeds a shared [`Tracker`] behind a `std::sync::Mutex` — byte hooks run
/// inline on the connection's task, never across an await point while
/// holding the lock, so a blocking mutex is sufficient here.
pub struct TrackingObserver {
    tracker: Arc<Mutex<Tracker>>,
}

impl TrackingObserver {
    pub fn new(tracker: Arc<Mutex<Tracker>>) -> Self {
        Self { tracker }
    }
}

impl Observer for TrackingObserver {
    fn on_client_bytes(&self, data: &[u8]) {
        self.tracker.lock().unwrap().on_client_bytes(data);
    }

    fn on_server_bytes(&self, data: &[u8]) {
        self.tracker.lock().unwrap().on_server_bytes(data);
    }
}
