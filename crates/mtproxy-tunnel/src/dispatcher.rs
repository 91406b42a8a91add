//! The accept loop: binds the proxy port and spawns one task per connection.
//! Grounded in `proxy_server.py`'s `ThreadingHTTPServer` subclass — a plain
//! accept-and-spawn loop, generalized from a thread per connection to a
//! tokio task per connection.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::connection::handle_connection;
use crate::context::ProxyState;
use crate::errors::Result;

/// Binds `bind_host:`[`mtproxy_config::PROXY_PORT`] and serves forever,
/// spawning a detached task per accepted connection.
pub async fn run(bind_host: &str, state: Arc<ProxyState>) -> Result<()> {
    let addr = format!("{bind_host}:{}", mtproxy_config::PROXY_PORT);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "mtm proxy listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        debug!(%peer, "accepted connection");
        let state = state.clone();
        tokio::spawn(async move {
            handle_connection(socket, state).await;
        });
    }
}
