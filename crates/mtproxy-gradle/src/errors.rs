use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum GradleError {
    #[error("io error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, GradleError>;
