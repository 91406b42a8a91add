//! Certificate Revocation List generation.
//!
//! Grounded in `cert_handler.py`'s `_generate_crl`: an empty CRL (no entries
//! are ever revoked; nothing here revokes a leaf) is (re)written immediately
//! after the root CA is created, valid for a year.

use std::path::Path;
use std::time::Duration;

use rcgen::CertificateRevocationListParams;
use time::OffsetDateTime;

use crate::errors::{CaError, Result};
use crate::root::RootCa;

pub const CRL_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Regenerates the CRL and writes it to `crl_path`. Always empty: the proxy
/// has no revocation workflow, it only needs a CRL endpoint leaves can point
/// to so browsers don't treat an absent distribution point as suspicious.
pub fn regenerate(ca: &RootCa, crl_path: &Path) -> Result<String> {
    let now = OffsetDateTime::now_utc();
    let params = CertificateRevocationListParams {
        this_update: now,
        next_update: now + CRL_VALIDITY,
        crl_number: rcgen::SerialNumber::from(1u64),
        issuing_distribution_point: None,
        revoked_certs: Vec::new(),
        key_identifier_method: rcgen::KeyIdMethod::Sha256,
    };

    let crl = params
        .signed_by(&ca.cert, &ca.key_pair)
        .map_err(CaError::CertBuild)?;
    let pem = crl.pem().map_err(CaError::CertBuild)?;

    if let Some(parent) = crl_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| CaError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(crl_path, pem.as_bytes()).map_err(|source| CaError::Io {
        path: crl_path.to_path_buf(),
        source,
    })?;

    Ok(pem)
}
