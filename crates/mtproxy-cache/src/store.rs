//! The on-disk cache store.
//!
//! Layout: `<cache_dir>/<shard>/` holds one `.meta` file plus one blob file
//! per entry, named by the entry's 4-hex-digit short id. Grounded in
//! `cache_handler.py`'s `CacheHandler`, with locking redone on top of
//! `async-fd-lock` rather than the source's `fcntl`-based lock file.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use mtproxy_config::{CACHE_MAX_FILE_SIZE, CACHE_MAX_TOTAL_SIZE, CACHE_MIN_FILE_SIZE};

use crate::errors::{CacheError, Result};
use crate::lock;
use crate::meta::{self, CacheKind, MetaRecord};

#[derive(Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn shard_dir(&self, kind: CacheKind, name: &str) -> PathBuf {
        self.root.join(meta::shard_key(kind, name))
    }

    fn blob_path(shard_dir: &Path, record: &MetaRecord) -> PathBuf {
        shard_dir.join(record.id_hex())
    }

    /// Whether a blob of `size` bytes for `kind` is eligible for caching at
    /// all. Certificates bypass the size bounds entirely; web files must
    /// fall within `[CACHE_MIN_FILE_SIZE, CACHE_MAX_FILE_SIZE]`.
    pub fn is_admissible(kind: CacheKind, size: u64) -> std::result::Result<(), &'static str> {
        if kind == CacheKind::Certificate {
            return Ok(());
        }
        if size < CACHE_MIN_FILE_SIZE {
            return Err("below CACHE_MIN_FILE_SIZE");
        }
        if size > CACHE_MAX_FILE_SIZE {
            return Err("above CACHE_MAX_FILE_SIZE");
        }
        Ok(())
    }

    /// Looks up a cached blob by kind and logical name. Returns `None` on a
    /// cache miss (no shard, no `.meta`, or no matching record).
    ///
    /// Per spec.md §4.1's read semantics, the `last_hit` refresh happens
    /// inside the *same* write-locked critical section as the lookup
    /// itself, not a read lock followed by a separately-locked `touch`:
    /// `async-fd-lock`'s flock is per-open-file-description, so a nested
    /// write-lock acquisition on a second fd for the same `.meta` would
    /// self-conflict with this call's own still-held read lock and stall
    /// for the full `LOCK_ACQUIRE_TIMEOUT` on every hit.
    pub async fn lookup(&self, kind: CacheKind, name: &str) -> Result<Option<Bytes>> {
        let shard_dir = self.shard_dir(kind, name);
        let shard = meta::shard_key(kind, name);

        if !lock::meta_path(&shard_dir).exists() {
            // No shard (or no `.meta`) at all yet: a miss, and not one that
            // should fabricate an empty shard by opening for write.
            return Ok(None);
        }

        let mut guard = lock::open_meta_for_write(&shard_dir).await?;

        let mut records = lock::read_records(&shard, guard.inner_mut()).await?;
        let Some(pos) = records.iter().position(|r| r.name == name) else {
            return Ok(None);
        };

        let blob_path = Self::blob_path(&shard_dir, &records[pos]);
        let bytes = tokio::fs::read(&blob_path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CacheError::OrphanMetadata {
                    shard: shard.clone(),
                    blob: blob_path.display().to_string(),
                }
            } else {
                CacheError::Io {
                    path: blob_path.clone(),
                    source,
                }
            }
        })?;

        records[pos].last_hit = now_epoch_seconds();
        lock::write_records(&mut guard, &shard_dir, &records).await?;

        Ok(Some(Bytes::from(bytes)))
    }

    /// Stores `data` under `(kind, name)`, evicting any prior entry with the
    /// same name first. Fails admission for out-of-bounds web file sizes.
    pub async fn store(&self, kind: CacheKind, name: &str, data: &[u8]) -> Result<()> {
        Self::is_admissible(kind, data.len() as u64).map_err(|reason| CacheError::Admission {
            name: name.to_string(),
            reason,
        })?;

        if kind != CacheKind::Certificate {
            let total = self.total_bytes().await?;
            if total.saturating_add(data.len() as u64) > CACHE_MAX_TOTAL_SIZE {
                return Err(CacheError::Admission {
                    name: name.to_string(),
                    reason: "would exceed CACHE_MAX_TOTAL_SIZE",
                });
            }
        }

        let shard_dir = self.shard_dir(kind, name);
        let shard = meta::shard_key(kind, name);
        let mut guard = lock::open_meta_for_write(&shard_dir).await?;

        let mut records = lock::read_records(&shard, guard.inner_mut()).await?;
        records.retain(|r| r.name != name);

        let id = meta::next_available_id(&shard, &records)?;
        let now = now_epoch_seconds();
        let record = MetaRecord {
            id,
            kind,
            name: name.to_string(),
            last_hit: now,
            size: data.len() as u64,
        };

        let blob_path = Self::blob_path(&shard_dir, &record);
        tokio::fs::write(&blob_path, data)
            .await
            .map_err(|source| CacheError::Io {
                path: blob_path,
                source,
            })?;

        records.push(record);
        lock::write_records(&mut guard, &shard_dir, &records).await
    }

    /// Updates `last_hit` for an existing entry without touching its blob.
    pub async fn touch(&self, kind: CacheKind, name: &str) -> Result<()> {
        let shard_dir = self.shard_dir(kind, name);
        let shard = meta::shard_key(kind, name);
        let mut guard = lock::open_meta_for_write(&shard_dir).await?;
        let mut records = lock::read_records(&shard, guard.inner_mut()).await?;
        let now = now_epoch_seconds();
        let mut found = false;
        for r in &mut records {
            if r.name == name {
                r.last_hit = now;
                found = true;
            }
        }
        if !found {
            return Ok(());
        }
        lock::write_records(&mut guard, &shard_dir, &records).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sums on-disk blob sizes across every shard, for the `CACHE_MAX_TOTAL_SIZE`
    /// admission check. Walks actual file sizes rather than trusting `.meta`,
    /// so a prior crash between blob write and meta rewrite can't under-count.
    async fn total_bytes(&self) -> Result<u64> {
        let mut total = 0u64;
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        while let Some(shard) = entries.next_entry().await.map_err(|source| CacheError::Io {
            path: self.root.clone(),
            source,
        })? {
            if !shard.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let Ok(mut files) = tokio::fs::read_dir(shard.path()).await else {
                continue;
            };
            while let Ok(Some(file)) = files.next_entry().await {
                if file.file_name() == ".meta" || file.file_name() == ".meta.lock" {
                    continue;
                }
                if let Ok(metadata) = file.metadata().await {
                    if metadata.is_file() {
                        total += metadata.len();
                    }
                }
            }
        }
        Ok(total)
    }
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn store_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let data = vec![b'x'; CACHE_MIN_FILE_SIZE as usize];
        store
            .store(CacheKind::WebFile, "http://example.com/big", &data)
            .await
            .unwrap();

        let found = store
            .lookup(CacheKind::WebFile, "http://example.com/big")
            .await
            .unwrap();
        assert_eq!(found.unwrap().as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn lookup_miss_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        assert!(store
            .lookup(CacheKind::WebFile, "http://example.com/nope")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn lookup_miss_does_not_fabricate_a_shard() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store
            .lookup(CacheKind::WebFile, "http://example.com/never-stored")
            .await
            .unwrap();
        let shard_dir = dir.path().join(meta::shard_key(CacheKind::WebFile, "http://example.com/never-stored"));
        assert!(!shard_dir.exists());
    }

    /// Regression test: `lookup` used to drop to a read lock and then
    /// re-lock for write inside a nested `touch` call, which self-deadlocks
    /// under `async-fd-lock`'s flock semantics and used to silently stall
    /// for the full `LOCK_ACQUIRE_TIMEOUT` on every hit. A single
    /// write-locked pass must complete near-instantly and still refresh
    /// `last_hit`.
    #[tokio::test]
    async fn lookup_refreshes_last_hit_without_stalling() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let data = vec![b'x'; CACHE_MIN_FILE_SIZE as usize];
        store.store(CacheKind::WebFile, "http://example.com/hot", &data).await.unwrap();

        let shard_dir = dir.path().join(meta::shard_key(CacheKind::WebFile, "http://example.com/hot"));
        let mut records = meta::parse_meta(
            "shard",
            &tokio::fs::read_to_string(shard_dir.join(".meta")).await.unwrap(),
        )
        .unwrap();
        records[0].last_hit = 1;
        tokio::fs::write(shard_dir.join(".meta"), meta::serialize_meta(&records)).await.unwrap();

        let before = now_epoch_seconds();
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            store.lookup(CacheKind::WebFile, "http://example.com/hot"),
        )
        .await
        .expect("lookup must not stall waiting on its own lock")
        .unwrap();
        assert_eq!(result.unwrap().as_ref(), data.as_slice());

        let refreshed = meta::parse_meta(
            "shard",
            &tokio::fs::read_to_string(shard_dir.join(".meta")).await.unwrap(),
        )
        .unwrap();
        assert!(refreshed[0].last_hit >= before);
    }

    #[tokio::test]
    async fn undersized_web_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let err = store
            .store(CacheKind::WebFile, "http://example.com/tiny", b"hi")
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Admission { .. }));
    }

    #[tokio::test]
    async fn certificates_bypass_size_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store
            .store(CacheKind::Certificate, "example.com", b"pem-bytes")
            .await
            .unwrap();
        let found = store.lookup(CacheKind::Certificate, "example.com").await.unwrap();
        assert_eq!(found.unwrap().as_ref(), b"pem-bytes");
    }

    #[tokio::test]
    async fn re_storing_replaces_prior_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let first = vec![b'a'; CACHE_MIN_FILE_SIZE as usize];
        let second = vec![b'b'; CACHE_MIN_FILE_SIZE as usize];
        store.store(CacheKind::WebFile, "http://example.com/x", &first).await.unwrap();
        store.store(CacheKind::WebFile, "http://example.com/x", &second).await.unwrap();

        let found = store.lookup(CacheKind::WebFile, "http://example.com/x").await.unwrap();
        assert_eq!(found.unwrap().as_ref(), second.as_slice());
    }
}
