//! RSA key generation.
//!
//! `rcgen` can import but not generate RSA key pairs, so fresh key material
//! comes from `openssl` and is handed to `rcgen::KeyPair::from_pem` for
//! certificate building — see `DESIGN.md` for why the CA uses both crates.

use openssl::pkey::PKey;
use openssl::rsa::Rsa;

use crate::errors::{CaError, Result};

pub const RSA_KEY_BITS: u32 = 2048;

/// Generates a fresh RSA-2048 key pair, returned as a PKCS#8 PEM string and
/// the `rcgen::KeyPair` built from it.
pub fn generate_rsa_keypair() -> Result<(String, rcgen::KeyPair)> {
    let rsa = Rsa::generate(RSA_KEY_BITS).map_err(CaError::KeyGen)?;
    let pkey = PKey::from_rsa(rsa).map_err(CaError::KeyGen)?;
    let pem = pkey.private_key_to_pem_pkcs8().map_err(CaError::KeyGen)?;
    let pem = String::from_utf8_lossy(&pem).into_owned();
    let key_pair = rcgen::KeyPair::from_pem(&pem).map_err(CaError::CertBuild)?;
    Ok((pem, key_pair))
}

/// Re-imports a previously generated key pair from its PKCS#8 PEM.
pub fn keypair_from_pem(pem: &str) -> Result<rcgen::KeyPair> {
    rcgen::KeyPair::from_pem(pem).map_err(CaError::CertBuild)
}
