//! The process-wide collection of in-flight/completed traces, grounded in
//! `log_handler.py`'s `RequestTracker`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::observer::{NoopObserver, Observer, TrackingObserver};
use crate::tracker::Tracker;
use crate::types::RequestTrace;

#[derive(Default)]
pub struct HistoryRegistry {
    next_id: AtomicU64,
    traces: Mutex<Vec<Arc<Mutex<Tracker>>>>,
}

impl HistoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new request and returns an [`Observer`] feeding it.
    /// `enabled = false` returns a zero-cost [`NoopObserver`] without
    /// touching the registry at all.
    pub fn start_request(&self, enabled: bool, url: impl Into<String>) -> Box<dyn Observer> {
        if !enabled {
            return Box::new(NoopObserver);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tracker = Arc::new(Mutex::new(Tracker::new(id, url)));
        self.traces.lock().unwrap().push(tracker.clone());
        Box::new(TrackingObserver::new(tracker))
    }

    pub fn snapshot(&self) -> Vec<RequestTrace> {
        self.traces
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.lock().unwrap().trace().clone())
            .collect()
    }
}
