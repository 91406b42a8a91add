//! SOCKS5 front door. Grounded in `socks_handler.py`: version/method
//! negotiation, the `CONNECT` request, and a traffic-type sniff performed on
//! the now-plain TCP stream to the target before a raw byte tunnel begins.
//!
//! This is a thin CONNECT-only adapter, not a second copy of the HTTP(S)
//! interception machinery. It never attempts MITM interception of what it
//! forwards.

mod detect;
mod errors;
mod reply;
mod request;
mod serve;

pub use detect::{detect_traffic_type, Sniff};
pub use errors::{Result, Socks5Error};
pub use reply::{send_failure, send_reply, ReplyCode};
pub use request::{negotiate, read_request, Address, Command, Request};
pub use serve::serve_connection;
