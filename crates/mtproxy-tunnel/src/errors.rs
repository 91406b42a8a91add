//! Error kinds for the connection state machine (network, protocol, cache,
//! tls, policy, fatal). Propagation is handled at the call sites; this enum
//! exists so those call sites match on a kind rather than a string.

#[derive(thiserror::Error, Debug)]
pub enum TunnelError {
    #[error("network error")]
    Network(#[from] std::io::Error),

    #[error("origin request failed")]
    OriginRequest(#[from] reqwest::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] mtproxy_http::HttpError),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("cache error: {0}")]
    Cache(#[from] mtproxy_cache::CacheError),

    #[error("certificate authority error: {0}")]
    Ca(#[from] mtproxy_ca::CaError),

    #[error("downloader error: {0}")]
    Downloader(#[from] mtproxy_downloader::DownloaderError),
}

pub type Result<T> = std::result::Result<T, TunnelError>;
