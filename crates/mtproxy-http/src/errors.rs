#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum HttpError {
    #[error("no header terminator found before limit")]
    IncompleteHeader,
    #[error("invalid request line: {0:?}")]
    BadRequestLine(String),
    #[error("invalid header line: {0:?}")]
    BadHeaderLine(String),
    #[error("no Host header, X-Forwarded-Host, or X-Host found for relative target")]
    NoHost,
    #[error("multi-range requests are not supported")]
    MultiRange,
    #[error("invalid Range header: {0:?}")]
    BadRange(String),
}

pub type Result<T> = std::result::Result<T, HttpError>;
