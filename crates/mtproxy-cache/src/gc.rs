//! Background garbage collection: TTL eviction, total-size trimming, and
//! orphan-shard sweeping. Grounded in `cache_handler.py`'s periodic cleanup
//! pass, run here as a `tokio::time::interval` loop instead of a dedicated
//! thread with a sleep.
//!
//! Every read-modify-write of a shard's `.meta` — TTL eviction and
//! size-based eviction alike — goes through the same advisory write lock
//! [`crate::store::CacheStore`] uses, per spec.md §4.1: "under the meta
//! lock, entries with `last_hit + TTL < now` are deleted."

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mtproxy_config::{CACHE_GC_INTERVAL, CACHE_MAX_TOTAL_SIZE, CACHE_TTL};
use tracing::{info, warn};

use crate::errors::Result;
use crate::lock;
use crate::meta::MetaRecord;

/// One sweep of the cache root: removes entries older than [`CACHE_TTL`],
/// then removes the least-recently-hit entries until the total cached size
/// is at or below [`CACHE_MAX_TOTAL_SIZE`]. Returns the number of entries
/// removed.
pub async fn gc_once(root: &Path) -> Result<usize> {
    let now = now_epoch_seconds();
    let ttl_cutoff = now.saturating_sub(CACHE_TTL.as_secs());

    let shards = list_shard_dirs(root).await?;

    let mut removed = 0usize;
    for shard_dir in &shards {
        removed += evict_expired(shard_dir, ttl_cutoff).await;
    }

    removed += enforce_total_size(&shards).await;
    removed += sweep_orphan_blobs(&shards).await;

    if removed > 0 {
        info!(removed, "cache gc sweep removed entries");
    }
    Ok(removed)
}

async fn list_shard_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut shards = Vec::new();
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(shards),
        Err(source) => {
            return Err(crate::errors::CacheError::Io {
                path: root.to_path_buf(),
                source,
            })
        }
    };
    while let Some(entry) = entries.next_entry().await.map_err(|source| crate::errors::CacheError::Io {
        path: root.to_path_buf(),
        source,
    })? {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            shards.push(entry.path());
        }
    }
    Ok(shards)
}

/// Under `shard_dir`'s meta lock: deletes every record whose `last_hit` is
/// older than `ttl_cutoff`, unlinking its blob first, then rewrites (or, if
/// nothing survives, removes) the shard. Returns the number removed.
async fn evict_expired(shard_dir: &Path, ttl_cutoff: u64) -> usize {
    let Ok(mut guard) = lock::open_meta_for_write(shard_dir).await else {
        warn!(shard = %shard_dir.display(), "skipping shard: failed to lock .meta for ttl sweep");
        return 0;
    };
    let shard_name = shard_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let Ok(records) = lock::read_records(&shard_name, guard.inner_mut()).await else {
        warn!(shard = %shard_name, "skipping shard with unparseable .meta during ttl sweep");
        return 0;
    };

    let (expired, kept): (Vec<MetaRecord>, Vec<MetaRecord>) =
        records.into_iter().partition(|r| r.last_hit < ttl_cutoff);
    if expired.is_empty() {
        return 0;
    }

    for record in &expired {
        tokio::fs::remove_file(shard_dir.join(record.id_hex())).await.ok();
    }

    if kept.is_empty() {
        drop(guard);
        tokio::fs::remove_dir_all(shard_dir).await.ok();
    } else if lock::write_records(&mut guard, shard_dir, &kept).await.is_err() {
        warn!(shard = %shard_name, "failed to persist .meta after ttl sweep");
    }

    expired.len()
}

/// Reads every surviving shard's current size (each read itself under that
/// shard's meta lock) and, if the sum exceeds [`CACHE_MAX_TOTAL_SIZE`],
/// evicts least-recently-hit entries shard by shard — each eviction
/// re-acquiring that shard's write lock — until back under budget.
async fn enforce_total_size(shards: &[PathBuf]) -> usize {
    let mut snapshot: Vec<(PathBuf, MetaRecord)> = Vec::new();
    for shard_dir in shards {
        let Ok(Some(mut guard)) = lock::open_meta_for_read(shard_dir).await else {
            continue;
        };
        let shard_name = shard_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let Ok(records) = lock::read_records(&shard_name, guard.inner_mut()).await else {
            continue;
        };
        snapshot.extend(records.into_iter().map(|r| (shard_dir.clone(), r)));
    }

    let mut total: u64 = snapshot.iter().map(|(_, r)| r.size).sum();
    if total <= CACHE_MAX_TOTAL_SIZE {
        return 0;
    }

    snapshot.sort_by_key(|(_, r)| r.last_hit);

    let mut removed = 0;
    for (shard_dir, record) in snapshot {
        if total <= CACHE_MAX_TOTAL_SIZE {
            break;
        }
        if evict_one(&shard_dir, record.id).await {
            total = total.saturating_sub(record.size);
            removed += 1;
        }
    }
    removed
}

/// Under `shard_dir`'s meta lock: removes the single record with `id`
/// (blob then meta), rewriting or removing the shard. Re-reads the current
/// records rather than trusting the caller's snapshot, since another
/// writer may have mutated the shard between the snapshot read and here.
async fn evict_one(shard_dir: &Path, id: u16) -> bool {
    let Ok(mut guard) = lock::open_meta_for_write(shard_dir).await else {
        return false;
    };
    let shard_name = shard_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let Ok(records) = lock::read_records(&shard_name, guard.inner_mut()).await else {
        return false;
    };

    let Some(record) = records.iter().find(|r| r.id == id).cloned() else {
        return false;
    };
    let kept: Vec<MetaRecord> = records.into_iter().filter(|r| r.id != id).collect();

    tokio::fs::remove_file(shard_dir.join(record.id_hex())).await.ok();

    if kept.is_empty() {
        drop(guard);
        tokio::fs::remove_dir_all(shard_dir).await.ok();
    } else if lock::write_records(&mut guard, shard_dir, &kept).await.is_err() {
        warn!(shard = %shard_name, "failed to persist .meta after size-based eviction");
    }
    true
}

/// Removes blob files under each shard with no corresponding `.meta`
/// record (and the `.meta` itself if it's gone missing), reading the
/// shard's current records under its lock. An orphaned blob is a bug
/// class, not a tolerated state.
async fn sweep_orphan_blobs(shards: &[PathBuf]) -> usize {
    let mut removed = 0;
    for shard_dir in shards {
        if !shard_dir.exists() {
            continue;
        }
        let shard_name = shard_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let live_ids: std::collections::HashSet<String> = match lock::open_meta_for_read(shard_dir).await {
            Ok(Some(mut guard)) => match lock::read_records(&shard_name, guard.inner_mut()).await {
                Ok(records) => records.iter().map(|r| r.id_hex()).collect(),
                Err(_) => continue,
            },
            Ok(None) => {
                // No `.meta` at all: the whole shard is orphaned.
                if let Ok(mut entries) = tokio::fs::read_dir(shard_dir).await {
                    while let Ok(Some(entry)) = entries.next_entry().await {
                        tokio::fs::remove_file(entry.path()).await.ok();
                        removed += 1;
                    }
                }
                tokio::fs::remove_dir_all(shard_dir).await.ok();
                continue;
            }
            Err(_) => continue,
        };

        let Ok(mut entries) = tokio::fs::read_dir(shard_dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == ".meta" || name == ".meta.lock" {
                continue;
            }
            if !live_ids.contains(&name) {
                tokio::fs::remove_file(entry.path()).await.ok();
                removed += 1;
            }
        }
    }
    removed
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs()
}

/// Runs [`gc_once`] every [`CACHE_GC_INTERVAL`] until cancelled. Intended to
/// be spawned as its own task alongside the proxy's connection dispatcher.
pub async fn run_gc_loop(root: PathBuf) {
    let mut interval = tokio::time::interval(CACHE_GC_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        match gc_once(&root).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, "periodic cache gc complete");
                }
            }
            Err(err) => warn!(error = %err, "cache gc sweep failed"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::{serialize_meta, CacheKind};
    use crate::store::CacheStore;

    #[tokio::test]
    async fn ttl_sweep_removes_stale_entries_and_their_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.store(CacheKind::WebFile, "http://example.com/a", &vec![b'x'; 2 * 1024 * 1024]).await.unwrap();

        let shard_dir = dir.path().join(crate::meta::shard_key(CacheKind::WebFile, "http://example.com/a"));
        let meta_text = tokio::fs::read_to_string(shard_dir.join(".meta")).await.unwrap();
        let mut records = crate::meta::parse_meta("shard", &meta_text).unwrap();
        records[0].last_hit = 1;
        tokio::fs::write(shard_dir.join(".meta"), serialize_meta(&records)).await.unwrap();

        let removed = evict_expired(&shard_dir, now_epoch_seconds() - 1).await;
        assert_eq!(removed, 1);
        assert!(!shard_dir.exists());
    }

    #[tokio::test]
    async fn ttl_sweep_keeps_fresh_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.store(CacheKind::WebFile, "http://example.com/b", &vec![b'y'; 2 * 1024 * 1024]).await.unwrap();

        let shard_dir = dir.path().join(crate::meta::shard_key(CacheKind::WebFile, "http://example.com/b"));
        let removed = evict_expired(&shard_dir, 1).await;
        assert_eq!(removed, 0);
        assert!(shard_dir.join(".meta").exists());
    }

    #[tokio::test]
    async fn orphan_blob_with_no_meta_record_is_swept() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.store(CacheKind::WebFile, "http://example.com/c", &vec![b'z'; 2 * 1024 * 1024]).await.unwrap();

        let shard_dir = dir.path().join(crate::meta::shard_key(CacheKind::WebFile, "http://example.com/c"));
        tokio::fs::write(shard_dir.join("ffff"), b"orphan").await.unwrap();

        let removed = sweep_orphan_blobs(&[shard_dir.clone()]).await;
        assert_eq!(removed, 1);
        assert!(!shard_dir.join("ffff").exists());
        assert!(shard_dir.join(".meta").exists());
    }

    #[tokio::test]
    async fn gc_once_on_empty_root_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert_eq!(gc_once(&missing).await.unwrap(), 0);
    }
}
