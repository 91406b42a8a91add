//! Drives one accepted SOCKS5 connection end to end: negotiate, read the
//! request, dial the target, and shuttle bytes once connected. Only
//! `CONNECT` is implemented — `BIND`/`UDP ASSOCIATE` are rejected, matching
//! `socks_handler.py`, which never implemented them either.

use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::detect::detect_traffic_type;
use crate::errors::{Result, Socks5Error};
use crate::reply::{send_failure, send_reply, ReplyCode};
use crate::request::{negotiate, read_request, Address, Command};

/// Negotiates, reads the request, dials the target, and tunnels bytes.
/// Returns once the tunnel closes in either direction.
pub async fn serve_connection(mut client: TcpStream) -> Result<()> {
    negotiate(&mut client).await?;
    let request = read_request(&mut client).await?;

    if request.command != Command::Connect {
        send_failure(&mut client, ReplyCode::GeneralFailure).await?;
        return Err(Socks5Error::UnsupportedCommand(0xff));
    }

    let target = match &request.address {
        Address::Ipv4(ip) => SocketAddr::new(IpAddr::V4(*ip), request.port).to_string(),
        Address::Ipv6(ip) => SocketAddr::new(IpAddr::V6(*ip), request.port).to_string(),
        Address::Domain(name) => format!("{name}:{}", request.port),
    };

    let mut upstream = match TcpStream::connect(&target).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(target = %target, error = %err, "socks5 target unreachable");
            send_failure(&mut client, ReplyCode::HostUnreachable).await?;
            return Err(err.into());
        }
    };

    let bound = upstream.local_addr().unwrap_or_else(|_| {
        SocketAddr::new(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 0)
    });
    send_reply(&mut client, ReplyCode::Succeeded, bound.ip(), bound.port()).await?;

    if let Ok(sniff) = detect_traffic_type(&upstream).await {
        debug!(target = %target, ?sniff, "sniffed socks5 target traffic type");
    }

    info!(target = %target, "socks5 tunnel established");
    tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_to_unreachable_target_replies_with_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = serve_connection(stream).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method_reply = [0u8; 2];
        client.read_exact(&mut method_reply).await.unwrap();
        assert_eq!(method_reply, [0x05, 0x00]);

        // CONNECT to a port nothing listens on.
        let mut req = vec![0x05, 0x01, 0x00, 0x01];
        req.extend_from_slice(&[127, 0, 0, 1]);
        req.extend_from_slice(&1u16.to_be_bytes());
        client.write_all(&req).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], ReplyCode::HostUnreachable as u8);

        server.await.unwrap();
    }
}
