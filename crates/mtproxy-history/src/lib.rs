//! Per-connection conversation tracking and request history log dumping.
//! Grounded in `log_handler.py`, redesigned around an explicit
//! [`Observer`] capability instead of a socket-wrapping decorator.

mod dump;
mod observer;
mod registry;
mod tracker;
mod types;

pub use dump::{default_log_dir, dump, log_file_path, SortBy};
pub use observer::{NoopObserver, Observer, TrackingObserver};
pub use registry::HistoryRegistry;
pub use tracker::Tracker;
pub use types::{Conversation, ConversationKind, Direction, RequestTrace};
