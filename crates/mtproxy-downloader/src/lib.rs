//! Parallel range-based download accelerator. Schedules a byte range into
//! chunks, fetches them concurrently with retry/backoff, and streams them
//! back to a consumer strictly in arrival order while integrating with the
//! on-disk cache. Grounded in `downloader.py`'s
//! `improved_multi_thread_download`.

mod errors;
mod orchestrator;
mod schedule;
mod worker;

pub use errors::{DownloaderError, Result};
pub use orchestrator::{Downloader, RangeDownload};
pub use schedule::{build_schedule, chunk_size_for, ChunkDescriptor};
