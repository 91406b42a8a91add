//! Logging and fatal-error helpers shared by every mtproxy binary.

mod logging;

pub use logging::{init_logging, LogArgs, LogFormat, LogLevel};

/// Turns a top-level fatal `Result::Err` into a logged message and a process
/// exit, instead of an unwind. Used only at the outermost edge of `main`.
pub trait OrBail<T> {
    fn or_bail(self, message: &str) -> T;
}

impl<T, E> OrBail<T> for Result<T, E>
where
    E: std::fmt::Display + std::fmt::Debug,
{
    fn or_bail(self, message: &str) -> T {
        match self {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(error_details = ?e, message);
                tracing::error!(error = %e, message);
                std::process::exit(1);
            }
        }
    }
}
