//! Wire parsing for the SOCKS5 negotiation and request messages, grounded in
//! `socks_handler.py`'s `_recv_initial_request`/`_recv_request`.

use std::net::{Ipv4Addr, Ipv6Addr};

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::errors::{Result, Socks5Error};

const VERSION: u8 = 0x05;
const NO_AUTH: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Bind,
    UdpAssociate,
}

impl Command {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0x01 => Ok(Command::Connect),
            0x02 => Ok(Command::Bind),
            0x03 => Ok(Command::UdpAssociate),
            other => Err(Socks5Error::UnsupportedCommand(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Domain(String),
    Ipv6(Ipv6Addr),
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Ipv4(ip) => write!(f, "{ip}"),
            Address::Domain(name) => write!(f, "{name}"),
            Address::Ipv6(ip) => write!(f, "{ip}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub address: Address,
    pub port: u16,
}

/// Reads and validates the version/method-selection handshake, replying with
/// "no authentication required". Lenient about trailing method bytes the
/// client may not have sent yet, matching the source's two-stage read.
pub async fn negotiate(stream: &mut TcpStream) -> Result<()> {
    let mut header = [0u8; 2];
    read_exact_or_closed(stream, &mut header, Socks5Error::ClosedDuringNegotiation).await?;

    if header[0] != VERSION {
        return Err(Socks5Error::UnsupportedVersion(header[0]));
    }
    let nmethods = header[1] as usize;

    let mut methods = vec![0u8; nmethods];
    read_exact_or_closed(stream, &mut methods, Socks5Error::ClosedDuringNegotiation).await?;

    if !methods.contains(&NO_AUTH) {
        return Err(Socks5Error::NoAcceptableAuthMethod);
    }

    use tokio::io::AsyncWriteExt;
    stream.write_all(&[VERSION, NO_AUTH]).await?;
    Ok(())
}

/// Reads the request line (`VER CMD RSV ATYP`), the address (whose shape
/// depends on `ATYP`), and the port.
pub async fn read_request(stream: &mut TcpStream) -> Result<Request> {
    let mut head = [0u8; 4];
    read_exact_or_closed(stream, &mut head, Socks5Error::ClosedDuringRequest).await?;
    let (version, cmd_byte, _rsv, addr_type) = (head[0], head[1], head[2], head[3]);
    if version != VERSION {
        return Err(Socks5Error::UnsupportedVersion(version));
    }
    let command = Command::from_byte(cmd_byte)?;

    let address = match addr_type {
        0x01 => {
            let mut buf = [0u8; 4];
            read_exact_or_closed(stream, &mut buf, Socks5Error::ClosedDuringRequest).await?;
            Address::Ipv4(Ipv4Addr::from(buf))
        }
        0x03 => {
            let mut len_buf = [0u8; 1];
            read_exact_or_closed(stream, &mut len_buf, Socks5Error::ClosedDuringRequest).await?;
            let mut name = vec![0u8; len_buf[0] as usize];
            read_exact_or_closed(stream, &mut name, Socks5Error::ClosedDuringRequest).await?;
            Address::Domain(String::from_utf8_lossy(&name).into_owned())
        }
        0x04 => {
            let mut buf = [0u8; 16];
            read_exact_or_closed(stream, &mut buf, Socks5Error::ClosedDuringRequest).await?;
            Address::Ipv6(Ipv6Addr::from(buf))
        }
        other => return Err(Socks5Error::UnsupportedAddressType(other)),
    };

    let mut port_buf = [0u8; 2];
    read_exact_or_closed(stream, &mut port_buf, Socks5Error::ClosedDuringRequest).await?;
    let port = u16::from_be_bytes(port_buf);

    Ok(Request { command, address, port })
}

async fn read_exact_or_closed(stream: &mut TcpStream, buf: &mut [u8], on_eof: Socks5Error) -> Result<()> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(on_eof),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_from_byte_rejects_unknown_commands() {
        assert!(matches!(Command::from_byte(0x01), Ok(Command::Connect)));
        assert!(matches!(Command::from_byte(0x02), Ok(Command::Bind)));
        assert!(matches!(Command::from_byte(0x03), Ok(Command::UdpAssociate)));
        assert!(matches!(Command::from_byte(0x7f), Err(Socks5Error::UnsupportedCommand(0x7f))));
    }

    #[test]
    fn address_display_matches_textual_form() {
        assert_eq!(Address::Ipv4(Ipv4Addr::new(127, 0, 0, 1)).to_string(), "127.0.0.1");
        assert_eq!(Address::Domain("example.com".into()).to_string(), "example.com");
    }
}
