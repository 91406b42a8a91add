//! `mfc.yaml` — the manual file cache table.
//!
//! Grounded in `mfc_handler.py`: a flat list of `{url, cache}` entries. A
//! `cache` value of `"true"`/`"false"` toggles whether the proxy's own cache
//! may store the URL's bytes; any other string is a local filesystem path
//! whose bytes should be served in place of fetching the URL at all.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum MfcError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as yaml: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path} entry for url {url:?} points at {cache_path:?}, which does not exist or is a directory")]
    BadCachePath {
        path: PathBuf,
        url: String,
        cache_path: PathBuf,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MfcEntry {
    pub url: String,
    pub cache: String,
}

/// A loaded, validated `mfc.yaml`. Empty (and always valid) if the file is
/// absent — the original only raised a startup error when the file existed
/// but was malformed.
#[derive(Debug, Clone, Default)]
pub struct MfcTable {
    entries: Vec<MfcEntry>,
}

impl MfcTable {
    /// Loads and validates `path`. Missing file is not an error; a malformed
    /// one is fatal at startup, matching `mfc_handler.py`'s
    /// `check_mfc_config` (raised before the module finishes importing).
    pub fn load(path: &Path) -> Result<Self, MfcError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| MfcError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let entries: Vec<MfcEntry> =
            serde_yaml::from_str(&raw).map_err(|source| MfcError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        for entry in &entries {
            if entry.cache != "true" && entry.cache != "false" {
                let cache_path = PathBuf::from(&entry.cache);
                if !cache_path.is_file() {
                    return Err(MfcError::BadCachePath {
                        path: path.to_path_buf(),
                        url: entry.url.clone(),
                        cache_path,
                    });
                }
            }
        }

        Ok(Self { entries })
    }

    /// True when `url` has an explicit `cache: "false"` entry.
    pub fn is_cache_disabled(&self, url: &str) -> bool {
        self.entries
            .iter()
            .find(|e| e.url == url)
            .is_some_and(|e| e.cache == "false")
    }

    /// The pre-staged local file standing in for `url`, if any.
    pub fn local_file_for(&self, url: &str) -> Option<PathBuf> {
        self.entries.iter().find(|e| e.url == url).and_then(|e| {
            if e.cache == "true" || e.cache == "false" {
                None
            } else {
                let p = PathBuf::from(&e.cache);
                p.is_file().then_some(p)
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_file_is_empty_table() {
        let table = MfcTable::load(Path::new("/nonexistent/mfc.yaml")).unwrap();
        assert!(!table.is_cache_disabled("http://example.com/x"));
        assert_eq!(table.local_file_for("http://example.com/x"), None);
    }

    #[test]
    fn disabled_entry_is_recognized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mfc.yaml");
        std::fs::write(
            &path,
            "- url: http://example.com/x\n  cache: \"false\"\n",
        )
        .unwrap();

        let table = MfcTable::load(&path).unwrap();
        assert!(table.is_cache_disabled("http://example.com/x"));
        assert!(!table.is_cache_disabled("http://example.com/y"));
    }

    #[test]
    fn invalid_cache_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mfc.yaml");
        std::fs::write(
            &path,
            "- url: http://example.com/x\n  cache: /does/not/exist\n",
        )
        .unwrap();

        assert!(matches!(
            MfcTable::load(&path),
            Err(MfcError::BadCachePath { .. })
        ));
    }

    #[test]
    fn local_file_entry_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("blob.bin");
        std::fs::write(&blob, b"hello").unwrap();
        let path = dir.path().join("mfc.yaml");
        std::fs::write(
            &path,
            format!("- url: http://example.com/x\n  cache: {:?}\n", blob),
        )
        .unwrap();

        let table = MfcTable::load(&path).unwrap();
        assert_eq!(table.local_file_for("http://example.com/x"), Some(blob));
    }
}
