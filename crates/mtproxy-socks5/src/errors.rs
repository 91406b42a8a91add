#[derive(thiserror::Error, Debug)]
pub enum Socks5Error {
    #[error("connection closed during negotiation")]
    ClosedDuringNegotiation,
    #[error("connection closed before request was fully received")]
    ClosedDuringRequest,
    #[error("unsupported SOCKS version: {0:#x}")]
    UnsupportedVersion(u8),
    #[error("no acceptable authentication methods offered")]
    NoAcceptableAuthMethod,
    #[error("unsupported address type: {0:#x}")]
    UnsupportedAddressType(u8),
    #[error("unsupported command: {0:#x}")]
    UnsupportedCommand(u8),
    #[error("invalid IPv6 address length: {0} bytes")]
    BadIpv6Length(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Socks5Error>;
