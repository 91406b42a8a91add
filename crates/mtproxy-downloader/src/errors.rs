#[derive(thiserror::Error, Debug)]
pub enum DownloaderError {
    #[error("request to origin failed")]
    Request(#[from] reqwest::Error),

    #[error("origin returned status {status} for bytes {start}-{end}")]
    BadStatus { status: u16, start: u64, end: u64 },

    #[error("chunk {start}-{end} expected {expected} bytes, got {got}")]
    LengthMismatch {
        start: u64,
        end: u64,
        expected: u64,
        got: u64,
    },

    #[error("cache error: {0}")]
    Cache(#[from] mtproxy_cache::CacheError),
}

pub type Result<T> = std::result::Result<T, DownloaderError>;
