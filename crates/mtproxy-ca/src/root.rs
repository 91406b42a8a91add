//! The root CA: a self-signed RSA-2048 certificate good for a year, CN "DO
//! NOT TRUST ...", matching `cert_handler.py`'s `generate_ca`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyUsagePurpose};
use time::OffsetDateTime;

use crate::errors::{CaError, Result};
use crate::keys;

pub const ROOT_COMMON_NAME: &str = "DO NOT TRUST multithread_downloading_proxy";
pub const ROOT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub struct RootCa {
    pub cert: rcgen::Certificate,
    pub cert_pem: String,
    pub key_pair: rcgen::KeyPair,
    pub key_pem: String,
}

impl RootCa {
    /// Generates new root key material and writes it to `cert_path` /
    /// `key_path`. Refuses to overwrite an existing CA — matching
    /// `generate_ca`'s `RuntimeError("CA certificate already exists")`.
    pub fn generate(cert_path: &Path, key_path: &Path) -> Result<Self> {
        if cert_path.exists() && key_path.exists() {
            return Err(CaError::AlreadyExists {
                cert_path: cert_path.to_path_buf(),
                key_path: key_path.to_path_buf(),
            });
        }

        let (key_pem, key_pair) = keys::generate_rsa_keypair()?;

        let mut params = CertificateParams::new(Vec::<String>::new()).map_err(CaError::CertBuild)?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, ROOT_COMMON_NAME);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + ROOT_VALIDITY;

        let cert = params.self_signed(&key_pair).map_err(CaError::CertBuild)?;
        let cert_pem = cert.pem();

        write(cert_path, cert_pem.as_bytes())?;
        write(key_path, key_pem.as_bytes())?;

        Ok(Self {
            cert,
            cert_pem,
            key_pair,
            key_pem,
        })
    }

    /// Loads previously generated root material. Returns [`CaError::NotFound`]
    /// if either file is missing.
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        if !cert_path.exists() || !key_path.exists() {
            return Err(CaError::NotFound);
        }

        let key_pem = std::fs::read_to_string(key_path).map_err(|source| CaError::Io {
            path: key_path.to_path_buf(),
            source,
        })?;
        let cert_pem = std::fs::read_to_string(cert_path).map_err(|source| CaError::Io {
            path: cert_path.to_path_buf(),
            source,
        })?;

        let key_pair = keys::keypair_from_pem(&key_pem)?;

        let params = CertificateParams::from_ca_cert_pem(&cert_pem).map_err(CaError::CertBuild)?;
        let cert = params.self_signed(&key_pair).map_err(CaError::CertBuild)?;

        Ok(Self {
            cert,
            cert_pem,
            key_pair,
            key_pem,
        })
    }

    pub fn load_or_generate(cert_path: &Path, key_path: &Path) -> Result<Self> {
        match Self::load(cert_path, key_path) {
            Ok(ca) => Ok(ca),
            Err(CaError::NotFound) => Self::generate(cert_path, key_path),
            Err(err) => Err(err),
        }
    }
}

fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| CaError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, bytes).map_err(|source| CaError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn default_paths(state_dir: &Path) -> (PathBuf, PathBuf) {
    (
        state_dir.join(mtproxy_config::CA_CERT_FILE),
        state_dir.join(mtproxy_config::CA_KEY_FILE),
    )
}
