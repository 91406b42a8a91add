//! Process-wide constants, the immutable [`RuntimeConfig`], and the `mfc.yaml`
//! manual-file-cache table.
//!
//! Every module-level mutable flag the original proxy carried (`with_cache`,
//! `with_history`, a global `mfc_config` list) is collapsed here into one
//! value, built once at startup and handed around by reference. Nothing in
//! this crate is a `static mut` or lazily-mutated global.

mod mfc;

pub use mfc::{MfcEntry, MfcTable};

use std::path::PathBuf;
use std::time::Duration;

/// Host the HTTP proxy and CRL server bind by default.
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";
/// Main HTTP/HTTPS proxy listen port.
pub const PROXY_PORT: u16 = 27579;
/// CRL-over-HTTP listen port.
pub const CRL_SERVER_PORT: u16 = 27580;
/// Optional SOCKS5 front door listen port.
pub const SOCKS5_PORT: u16 = 27581;

/// SANs force-appended to every issued leaf certificate, regardless of the
/// caller-supplied SAN list.
pub const ALWAYS_APPEND_DOMAIN_NAMES: &[&str] = &[];

pub const CA_CERT_FILE: &str = "ca_server.crt";
pub const CA_KEY_FILE: &str = "ca_server.key";
pub const CRL_FILE: &str = "crl.pem";
pub const MFC_CONFIG_FILE: &str = "mfc.yaml";
pub const CACHE_DIR: &str = ".cache";
pub const HISTORY_DIR: &str = "log";

pub const HISTORY_DIVIDER_H1: &str = "##=============##";
pub const HISTORY_DIVIDER_H2: &str = "===========";

/// Downloader worker pool size.
pub const DOWNLOADER_MAX_THREADS: usize = 32;
/// GET responses at or above this size are routed through the parallel downloader.
pub const DOWNLOADER_MULTIPART_THRESHOLD: u64 = 1024 * 1024;
/// Upper bound on a single chunk's byte span, regardless of the sizing policy.
pub const DOWNLOADER_MAX_CHUNK_SIZE: u64 = 8 * 1024 * 1024;
pub const DOWNLOADER_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DOWNLOADER_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DOWNLOADER_MAX_RETRIES: u32 = 3;
pub const HEAD_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const SOCKET_OP_TIMEOUT: Duration = Duration::from_secs(30);
pub const LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
pub const CLOSE_DRAIN_SLEEP: Duration = Duration::from_secs(10);

pub const CACHE_MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;
pub const CACHE_MIN_FILE_SIZE: u64 = 1024 * 1024;
pub const CACHE_MAX_TOTAL_SIZE: u64 = 10 * 1024 * 1024 * 1024;
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const CACHE_GC_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub const CLIENT_SOCKET_MAX_CACHE_SIZE: usize = 64 * 1024;
pub const TUNNEL_RECV_SIZE: usize = 4096;
pub const TUNNEL_RECV_BUFFER_SIZE: usize = 1024 * 1024;

/// How the CA should key a freshly-issued leaf's private key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeafKeyStrategy {
    /// Mirror the source: the leaf's public key IS the root's public key, so
    /// the root's private key signs both the root and every leaf. Leaves can
    /// then be cached as PEM certs alone (no private key file needed).
    #[default]
    ReuseRootKey,
    /// Generate a fresh key pair per leaf. More conventional, but means the
    /// cache must also retain a private key per cached leaf.
    FreshPerLeaf,
}

/// Toggles read from the CLI at startup and never mutated afterward.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub with_cache: bool,
    pub with_history: bool,
    pub gradle: bool,
    pub socks5: bool,
    pub bind_host: String,
    pub leaf_key_strategy: LeafKeyStrategy,
    pub mfc: MfcTable,
    pub gradle_properties_path: PathBuf,
}

impl RuntimeConfig {
    pub fn crl_distribution_url(&self) -> String {
        format!("http://{}:{}/crl.pem", self.bind_host, CRL_SERVER_PORT)
    }
}

/// `GRADLE_USER_HOME`, defaulting to `~/.gradle`.
pub fn gradle_user_home() -> PathBuf {
    std::env::var_os("GRADLE_USER_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            home.join(".gradle")
        })
}

pub fn gradle_properties_path() -> PathBuf {
    gradle_user_home().join("gradle.properties")
}
