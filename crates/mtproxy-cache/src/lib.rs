//! Content-addressed, sharded, advisory-locked on-disk cache.
//!
//! Entries are keyed by `(kind, name)`; `name` is a caller-chosen logical
//! key (a canonicalized URL for [`CacheKind::WebFile`], a `base_domain`
//! string for [`CacheKind::Certificate`]). Each entry lives in a shard
//! directory named by the sha256 of its kind label and name, alongside a
//! tab-separated `.meta` index of every entry in that shard. See
//! `cache_handler.py` for the layout this generalizes.

mod errors;
mod gc;
mod lock;
mod meta;
mod store;

pub use errors::{CacheError, Result};
pub use gc::{gc_once, run_gc_loop};
pub use meta::{shard_key, CacheKind, MetaRecord};
pub use store::CacheStore;
