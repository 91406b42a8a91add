//! Server-to-client SOCKS5 reply frames, grounded in `socks_handler.py`'s
//! `_send_reply`.

use std::net::{IpAddr, Ipv4Addr};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    HostUnreachable = 0x04,
}

/// Writes a reply frame with the given status and bound address/port. Callers
/// that have no bind address yet (the common CONNECT success/failure cases)
/// pass `0.0.0.0:0`, matching the source's defaults.
pub async fn send_reply(
    stream: &mut TcpStream,
    code: ReplyCode,
    bind_addr: IpAddr,
    bind_port: u16,
) -> Result<()> {
    let mut frame = vec![0x05, code as u8, 0x00];
    match bind_addr {
        IpAddr::V4(v4) => {
            frame.push(0x01);
            frame.extend_from_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            frame.push(0x04);
            frame.extend_from_slice(&v6.octets());
        }
    }
    frame.extend_from_slice(&bind_port.to_be_bytes());
    stream.write_all(&frame).await?;
    Ok(())
}

pub async fn send_failure(stream: &mut TcpStream, code: ReplyCode) -> Result<()> {
    send_reply(stream, code, IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reply_code_values_match_the_socks5_rfc() {
        assert_eq!(ReplyCode::Succeeded as u8, 0x00);
        assert_eq!(ReplyCode::GeneralFailure as u8, 0x01);
        assert_eq!(ReplyCode::HostUnreachable as u8, 0x04);
    }
}
