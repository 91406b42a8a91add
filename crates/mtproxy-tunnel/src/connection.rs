//! The per-connection state machine: Reading a header, Deciding what to do
//! with it, then either issuing a leaf certificate and
//! looping back into Reading over TLS, serving an intercepted response
//! directly, or falling back to a raw bidirectional tunnel (itself capable
//! of re-inspecting a later header that arrives mid-tunnel).
//!
//! `CONNECT` is handled by swapping the connection's `Box<dyn AsyncStream>`
//! for a TLS-wrapped one and looping, rather than recursing — Rust's async
//! functions can't recurse without boxing the future at every level, and the
//! loop reads the same either way.

use std::sync::Arc;

use mtproxy_ca::base_domain_of;
use mtproxy_history::Observer;
use mtproxy_http::{find_header_boundary, parse_request, ParsedRequest};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::context::ProxyState;
use crate::decision::{on_header, InterceptDecision};
use crate::errors::{Result, TunnelError};
use crate::stream::AsyncStream;
use crate::tls::{client_connector, server_acceptor, server_name};

const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Request-line method prefixes recognized when re-scanning a tunnel's raw
/// byte stream for the start of a pipelined follow-up request.
const METHOD_PREFIXES: &[&str] = &[
    "GET ", "POST ", "HEAD ", "PUT ", "DELETE ", "OPTIONS ", "PATCH ", "CONNECT ",
];

type BoxedRead = ReadHalf<Box<dyn AsyncStream>>;
type BoxedWrite = WriteHalf<Box<dyn AsyncStream>>;

/// Drives one accepted TCP connection end to end. Never returns an `Err` to
/// the caller — failures are logged and the connection is simply closed,
/// for anything that isn't an origin request (which degrades to `Pass`
/// instead).
pub async fn handle_connection(raw: TcpStream, state: Arc<ProxyState>) {
    let mut socket: Box<dyn AsyncStream> = Box::new(raw);

    if let Err(err) = serve(&mut socket, &state).await {
        debug!(error = %err, "connection ended");
    }

    tokio::time::sleep(mtproxy_config::CLOSE_DRAIN_SLEEP).await;
    let _ = socket.shutdown().await;
}

async fn serve(socket: &mut Box<dyn AsyncStream>, state: &Arc<ProxyState>) -> Result<()> {
    let mut is_tls = false;

    loop {
        let buf = read_until_header_boundary(socket.as_mut()).await?;
        let request = parse_request(&buf, is_tls)?;
        let trailing = buf[request.consumed..].to_vec();

        if request.method.eq_ignore_ascii_case("CONNECT") {
            handle_connect(socket, &mut is_tls, &request, state).await?;
            continue;
        }

        let observer: Arc<dyn Observer> = Arc::from(
            state
                .history
                .start_request(state.config.with_history, request.absolute_url.clone()),
        );
        observer.on_client_bytes(&buf[..request.consumed]);

        match on_header(&request, socket.as_mut(), state).await? {
            InterceptDecision::CloseDirectly => return Ok(()),
            InterceptDecision::NoPass => continue,
            InterceptDecision::Pass => {
                return run_tunnel(
                    socket,
                    is_tls,
                    &request,
                    &buf[..request.consumed],
                    &trailing,
                    state,
                    observer,
                )
                .await;
            }
        }
    }
}

async fn read_until_header_boundary(socket: &mut dyn AsyncStream) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8 * 1024];

    loop {
        if find_header_boundary(&buf).is_some() {
            return Ok(buf);
        }

        let n = tokio::time::timeout(mtproxy_config::SOCKET_OP_TIMEOUT, socket.read(&mut chunk))
            .await
            .map_err(|_| {
                TunnelError::Network(std::io::Error::new(std::io::ErrorKind::TimedOut, "header read timed out"))
            })??;

        if n == 0 {
            return Err(TunnelError::Network(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "client closed before sending a complete header",
            )));
        }

        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Replaces `*socket` with a short-lived placeholder so its previous
/// contents can be moved out by value (needed to hand ownership to
/// [`tokio_rustls::TlsAcceptor::accept`] / [`tokio::io::split`], which both
/// consume their stream). The placeholder is a zero-capacity in-memory duplex
/// half: reading it yields EOF immediately and nothing is ever written to it,
/// since callers always overwrite or drop it before touching `socket` again.
fn take_socket(socket: &mut Box<dyn AsyncStream>) -> Box<dyn AsyncStream> {
    let (placeholder, _unused_peer) = tokio::io::duplex(1);
    std::mem::replace(socket, Box::new(placeholder))
}

async fn handle_connect(
    socket: &mut Box<dyn AsyncStream>,
    is_tls: &mut bool,
    request: &ParsedRequest,
    state: &ProxyState,
) -> Result<()> {
    socket.write_all(CONNECT_ESTABLISHED).await?;

    let host = request.target.split(':').next().unwrap_or(&request.target);
    let base_domain = base_domain_of(host);
    let sans = vec![base_domain.clone(), format!("*.{base_domain}")];

    let leaf = mtproxy_ca::get_or_issue_leaf(
        &state.cache,
        &state.ca,
        state.config.leaf_key_strategy,
        &state.config.crl_distribution_url(),
        &base_domain,
        &sans,
    )
    .await?;

    let acceptor = server_acceptor(&leaf.cert_pem, &state.ca.cert_pem, &leaf.key_pem)?;

    let owned = take_socket(socket);
    let tls_stream = acceptor
        .accept(owned)
        .await
        .map_err(|e| TunnelError::Tls(e.to_string()))?;

    *socket = Box::new(tls_stream);
    *is_tls = true;
    Ok(())
}

fn target_authority(request: &ParsedRequest) -> Result<String> {
    let url = url::Url::parse(&request.absolute_url)
        .map_err(|_| TunnelError::Tls(format!("invalid absolute url: {}", request.absolute_url)))?;
    let host = url
        .host_str()
        .ok_or_else(|| TunnelError::Tls(format!("url has no host: {}", request.absolute_url)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| TunnelError::Tls(format!("url has no known port: {}", request.absolute_url)))?;
    Ok(format!("{host}:{port}"))
}

async fn dial_origin(request: &ParsedRequest, is_tls: bool) -> Result<Box<dyn AsyncStream>> {
    let authority = target_authority(request)?;
    let tcp = TcpStream::connect(&authority).await?;

    if !is_tls {
        return Ok(Box::new(tcp));
    }

    let host = authority.split(':').next().unwrap_or(&authority).to_string();
    let connector = client_connector();
    let name = server_name(&host)?;
    let tls = connector
        .connect(name, tcp)
        .await
        .map_err(|e| TunnelError::Tls(e.to_string()))?;
    Ok(Box::new(tls))
}

fn looks_like_request_start(buf: &[u8]) -> bool {
    let probe_len = buf.len().min(16);
    let text = String::from_utf8_lossy(&buf[..probe_len]);
    METHOD_PREFIXES.iter().any(|p| text.starts_with(p))
}

/// Re-runs the interception decision on a header that showed up mid-tunnel
/// (an HTTP keep-alive connection pipelining a second request). A `CONNECT`
/// here can't be serviced without tearing down and rebuilding the TLS
/// wrapping this function has no access to, so it degrades to `NoPass`:
/// the bytes are dropped from the forwarded stream and the tunnel keeps
/// running, letting the client's retry (if any) arrive on a fresh
/// connection instead.
async fn reinspect_header(
    header_bytes: &[u8],
    is_tls: bool,
    client_write: &AsyncMutex<BoxedWrite>,
    state: &ProxyState,
) -> Result<InterceptDecision> {
    if header_bytes.len() >= 7 && header_bytes[..7].eq_ignore_ascii_case(b"CONNECT") {
        return Ok(InterceptDecision::NoPass);
    }

    let request = match parse_request(header_bytes, is_tls) {
        Ok(request) => request,
        Err(_) => return Ok(InterceptDecision::NoPass),
    };

    let mut guard = client_write.lock().await;
    on_header(&request, &mut *guard, state).await
}

#[allow(clippy::too_many_arguments)]
async fn run_tunnel(
    socket: &mut Box<dyn AsyncStream>,
    is_tls: bool,
    request: &ParsedRequest,
    header_bytes: &[u8],
    trailing: &[u8],
    state: &Arc<ProxyState>,
    observer: Arc<dyn Observer>,
) -> Result<()> {
    let origin = dial_origin(request, is_tls).await?;
    let client = take_socket(socket);

    let (client_read, client_write) = tokio::io::split(client);
    let (origin_read, origin_write) = tokio::io::split(origin);
    let client_write = Arc::new(AsyncMutex::new(client_write));
    let origin_write = Arc::new(AsyncMutex::new(origin_write));

    {
        let mut guard = origin_write.lock().await;
        guard.write_all(header_bytes).await?;
        if !trailing.is_empty() {
            guard.write_all(trailing).await?;
        }
    }

    let (stop_tx, stop_rx) = watch::channel(false);

    let client_to_origin = pump_client_to_origin(
        client_read,
        origin_write,
        client_write.clone(),
        observer.clone(),
        is_tls,
        state.clone(),
        stop_tx,
    );
    let origin_to_client = pump_origin_to_client(origin_read, client_write, observer, stop_rx);

    let (r1, r2) = tokio::join!(client_to_origin, origin_to_client);
    r1?;
    r2?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn pump_client_to_origin(
    mut client_read: BoxedRead,
    origin_write: Arc<AsyncMutex<BoxedWrite>>,
    client_write: Arc<AsyncMutex<BoxedWrite>>,
    observer: Arc<dyn Observer>,
    is_tls: bool,
    state: Arc<ProxyState>,
    stop_tx: watch::Sender<bool>,
) -> Result<()> {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; mtproxy_config::TUNNEL_RECV_SIZE];

    loop {
        let n = client_read.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        observer.on_client_bytes(&buf[..n]);
        pending.extend_from_slice(&buf[..n]);

        if !looks_like_request_start(&pending) {
            let mut guard = origin_write.lock().await;
            guard.write_all(&pending).await?;
            pending.clear();
            continue;
        }

        let Some(boundary) = find_header_boundary(&pending) else {
            // Still accumulating a complete header; wait for more bytes
            // rather than forwarding a partial request line.
            continue;
        };

        let header = pending[..boundary].to_vec();
        match reinspect_header(&header, is_tls, &client_write, &state).await? {
            InterceptDecision::Pass => {
                let mut guard = origin_write.lock().await;
                guard.write_all(&pending).await?;
                pending.clear();
            }
            InterceptDecision::CloseDirectly => {
                let _ = stop_tx.send(true);
                break;
            }
            InterceptDecision::NoPass => {
                pending.drain(..boundary);
            }
        }
    }

    let mut guard = origin_write.lock().await;
    let _ = guard.shutdown().await;
    Ok(())
}

async fn pump_origin_to_client(
    mut origin_read: BoxedRead,
    client_write: Arc<AsyncMutex<BoxedWrite>>,
    observer: Arc<dyn Observer>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<()> {
    let mut buf = [0u8; mtproxy_config::TUNNEL_RECV_SIZE];

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            result = origin_read.read(&mut buf) => {
                let n = result?;
                if n == 0 {
                    break;
                }
                observer.on_server_bytes(&buf[..n]);
                let mut guard = client_write.lock().await;
                guard.write_all(&buf[..n]).await?;
            }
        }
    }

    let mut guard = client_write.lock().await;
    let _ = guard.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognizes_common_method_prefixes() {
        assert!(looks_like_request_start(b"GET /x HTTP/1.1\r\n"));
        assert!(looks_like_request_start(b"POST /x HTTP/1.1\r\n"));
        assert!(!looks_like_request_start(b"not a request at all"));
    }

    #[test]
    fn target_authority_defaults_https_port() {
        let request = parse_request(
            b"GET https://example.com/a HTTP/1.1\r\nHost: example.com\r\n\r\n",
            true,
        )
        .unwrap();
        assert_eq!(target_authority(&request).unwrap(), "example.com:443");
    }

    #[test]
    fn target_authority_uses_explicit_port() {
        let request = parse_request(
            b"GET http://example.com:8080/a HTTP/1.1\r\nHost: example.com:8080\r\n\r\n",
            false,
        )
        .unwrap();
        assert_eq!(target_authority(&request).unwrap(), "example.com:8080");
    }
}
