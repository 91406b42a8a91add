use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("io error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out acquiring lock on {path:?}")]
    LockTimeout { path: PathBuf },

    #[error("meta data for shard {shard} references missing blob {blob}")]
    OrphanMetadata { shard: String, blob: String },

    #[error("malformed meta line in shard {shard}: {line:?}")]
    MalformedMeta { shard: String, line: String },

    #[error("no available cache id in shard {shard} (65535 entries in use)")]
    ShardFull { shard: String },

    #[error("admission refused for {name}: {reason}")]
    Admission { name: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, CacheError>;
