use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CaError {
    #[error("io error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("openssl error generating key material")]
    KeyGen(#[source] openssl::error::ErrorStack),

    #[error("rcgen error building certificate")]
    CertBuild(#[source] rcgen::Error),

    #[error("CA material already exists at {cert_path} / {key_path}")]
    AlreadyExists { cert_path: PathBuf, key_path: PathBuf },

    #[error("CA material not found; run with --generate-ca first")]
    NotFound,

    #[error("cache error: {0}")]
    Cache(#[from] mtproxy_cache::CacheError),
}

pub type Result<T> = std::result::Result<T, CaError>;
