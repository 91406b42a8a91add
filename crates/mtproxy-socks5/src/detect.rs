//! Traffic-type sniffing ahead of the HTTP(S) dispatcher, grounded in
//! `socks_handler.py`'s `_detect_traffic_type`.
//!
//! Unlike the source, which tracks a manual peek buffer because it reads
//! raw sockets, this uses `TcpStream::peek`: the sniffed bytes are left in
//! the kernel's receive buffer, so the caller's first real read still sees
//! them.

use tokio::net::TcpStream;

use crate::errors::Result;

const PEEK_LEN: usize = 16;
const HTTP_METHOD_PREFIXES: &[&str] = &["GET ", "POST ", "PUT ", "DELETE ", "HEAD ", "OPTIONS ", "CONNECT "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniff {
    /// A TLS ClientHello (`0x16 0x03 ...`): treat as HTTPS to intercept.
    Tls,
    /// A recognizable plaintext HTTP request line.
    Http,
    /// Neither: forward the raw bytes without interception.
    Opaque,
}

pub async fn detect_traffic_type(stream: &TcpStream) -> Result<Sniff> {
    let mut buf = [0u8; PEEK_LEN];
    let n = stream.peek(&mut buf).await?;
    let data = &buf[..n];

    if data.len() >= 3 && data[0] == 0x16 && data[1] == 0x03 {
        return Ok(Sniff::Tls);
    }

    if data.len() >= 7 {
        let text = String::from_utf8_lossy(data);
        let first_line = text.split("\r\n").next().unwrap_or("");
        if HTTP_METHOD_PREFIXES.iter().any(|p| first_line.starts_with(p)) {
            return Ok(Sniff::Http);
        }
    }

    Ok(Sniff::Opaque)
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accept, connect) = tokio::join!(listener.accept(), connect);
        (accept.unwrap().0, connect.unwrap())
    }

    #[tokio::test]
    async fn detects_tls_client_hello() {
        let (server, mut client) = connected_pair().await;
        client.write_all(&[0x16, 0x03, 0x01, 0x00, 0x05]).await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(detect_traffic_type(&server).await.unwrap(), Sniff::Tls);
    }

    #[tokio::test]
    async fn detects_plain_http_get() {
        let (server, mut client) = connected_pair().await;
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(detect_traffic_type(&server).await.unwrap(), Sniff::Http);
    }

    #[tokio::test]
    async fn falls_back_to_opaque_for_unrecognized_bytes() {
        let (server, mut client) = connected_pair().await;
        client.write_all(b"\x00\x01\x02\x03random-binary-data").await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(detect_traffic_type(&server).await.unwrap(), Sniff::Opaque);
    }
}
