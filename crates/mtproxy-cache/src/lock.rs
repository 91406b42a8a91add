//! Shared advisory-lock plumbing for `.meta` reads/writes, used by both
//! [`crate::store`] (per-request lookups/stores) and [`crate::gc`]
//! (background eviction). Locking a shard's `.meta` is the sole arbiter for
//! concurrent mutation of that shard, across both call sites and across
//! cooperating processes — see spec.md §4.1's locking invariant.

use std::path::{Path, PathBuf};

use async_fd_lock::{LockRead, LockWrite};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

use mtproxy_config::LOCK_ACQUIRE_TIMEOUT;

use crate::errors::{CacheError, Result};
use crate::meta::{self, MetaRecord};

pub fn meta_path(shard_dir: &Path) -> PathBuf {
    shard_dir.join(".meta")
}

/// Opens and write-locks a shard's `.meta`, creating the shard directory and
/// an empty `.meta` file if neither exists yet.
pub async fn open_meta_for_write(shard_dir: &Path) -> Result<async_fd_lock::RwLockWriteGuard<tokio::fs::File>> {
    tokio::fs::create_dir_all(shard_dir)
        .await
        .map_err(|source| CacheError::Io {
            path: shard_dir.to_path_buf(),
            source,
        })?;

    let path = meta_path(shard_dir);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .await
        .map_err(|source| CacheError::Io { path: path.clone(), source })?;

    tokio::time::timeout(LOCK_ACQUIRE_TIMEOUT, file.lock_write())
        .await
        .map_err(|_| CacheError::LockTimeout { path: path.clone() })?
        .map_err(|e| CacheError::Io { path, source: e.error })
}

/// Opens and read-locks a shard's `.meta`. Returns `None` when the shard (or
/// its `.meta`) doesn't exist at all.
pub async fn open_meta_for_read(shard_dir: &Path) -> Result<Option<async_fd_lock::RwLockReadGuard<tokio::fs::File>>> {
    let path = meta_path(shard_dir);
    if !path.exists() {
        return Ok(None);
    }

    let file = OpenOptions::new()
        .read(true)
        .open(&path)
        .await
        .map_err(|source| CacheError::Io { path: path.clone(), source })?;

    let guard = tokio::time::timeout(LOCK_ACQUIRE_TIMEOUT, file.lock_read())
        .await
        .map_err(|_| CacheError::LockTimeout { path: path.clone() })?
        .map_err(|e| CacheError::Io { path, source: e.error })?;

    Ok(Some(guard))
}

pub async fn read_records(shard: &str, file: &mut (impl tokio::io::AsyncRead + Unpin)) -> Result<Vec<MetaRecord>> {
    let mut text = String::new();
    file.read_to_string(&mut text)
        .await
        .map_err(|source| CacheError::Io {
            path: PathBuf::from(shard),
            source,
        })?;
    meta::parse_meta(shard, &text)
}

pub async fn write_records(
    guard: &mut async_fd_lock::RwLockWriteGuard<tokio::fs::File>,
    shard_dir: &Path,
    records: &[MetaRecord],
) -> Result<()> {
    let path = meta_path(shard_dir);
    let text = meta::serialize_meta(records);
    let file = guard.inner_mut();
    file.seek(SeekFrom::Start(0))
        .await
        .map_err(|source| CacheError::Io { path: path.clone(), source })?;
    file.set_len(0).await.map_err(|source| CacheError::Io { path: path.clone(), source })?;
    file.write_all(text.as_bytes())
        .await
        .map_err(|source| CacheError::Io { path: path.clone(), source })?;
    file.flush().await.map_err(|source| CacheError::Io { path, source })
}
