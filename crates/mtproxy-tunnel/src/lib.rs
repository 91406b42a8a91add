//! The core connection state machine: per-connection Reading → Decide →
//! {IssueCert → TLS → Reading | ServeInterception | RawTunnel} → Closed, and
//! the accept-loop dispatcher that spawns one of these per incoming TCP
//! connection.

mod connection;
mod context;
mod decision;
mod dispatcher;
mod errors;
mod head_probe;
mod stream;
mod tls;

pub use context::ProxyState;
pub use decision::InterceptDecision;
pub use dispatcher::run;
pub use errors::{Result, TunnelError};
