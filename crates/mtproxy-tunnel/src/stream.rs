//! A single trait standing in for "whatever the connection's current byte
//! channel is" — a plain [`TcpStream`], or a [`tokio_rustls::server::TlsStream`]
//! wrapping one after a CONNECT issues a leaf certificate. The state machine
//! in `connection.rs` only ever holds a `Box<dyn AsyncStream>`, so stepping
//! from plaintext to TLS is a matter of replacing the box, not a second copy
//! of the read/decide/respond loop.

use tokio::io::{AsyncRead, AsyncWrite};

pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}
