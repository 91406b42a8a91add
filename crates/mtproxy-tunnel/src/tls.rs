//! TLS wrapping on both sides of a CONNECT tunnel: the server side presents
//! a freshly issued leaf certificate to the client (MITM termination); the
//! client side dials the real origin with a standard web root store when
//! the state machine needs to tunnel TLS bytes through to it.

use std::io::Cursor;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::errors::{Result, TunnelError};

/// Builds a [`TlsAcceptor`] presenting `leaf_pem` (chained to `root_pem`)
/// and signed with `key_pem`. Used once per CONNECT to terminate the
/// client's TLS handshake with a just-issued leaf.
pub fn server_acceptor(leaf_pem: &str, root_pem: &str, key_pem: &str) -> Result<TlsAcceptor> {
    let mut chain = parse_certs(leaf_pem)?;
    chain.extend(parse_certs(root_pem)?);
    let key = parse_key(key_pem)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| TunnelError::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Builds a [`TlsConnector`] trusting the standard web root store, used
/// when the state machine TLS-wraps the outbound side of a tunnel whose
/// client channel was itself TLS.
pub fn client_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string()).map_err(|_| TunnelError::Tls(format!("invalid server name: {host}")))
}

fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut Cursor::new(pem.as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TunnelError::Tls(format!("failed to parse certificate PEM: {e}")))
}

fn parse_key(pem: &str) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut Cursor::new(pem.as_bytes()))
        .map_err(|e| TunnelError::Tls(format!("failed to parse private key PEM: {e}")))?
        .ok_or_else(|| TunnelError::Tls("no private key found in PEM".to_string()))
}
