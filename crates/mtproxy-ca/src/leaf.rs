//! Leaf certificate issuance, memoized through [`mtproxy_cache`].
//!
//! Grounded in `cert_handler.py`'s `_issue_certificate`/`get_certificate`:
//! cache key is `base_domain + ":" + sorted SAN list joined by commas`, and
//! `ALWAYS_APPEND_DOMAIN_NAMES` is unconditionally appended to every leaf's
//! SAN set before issuance.

use std::time::Duration;

use mtproxy_cache::{CacheKind, CacheStore};
use mtproxy_config::{LeafKeyStrategy, ALWAYS_APPEND_DOMAIN_NAMES};
use rcgen::{
    BasicConstraints, CertificateParams, CrlDistributionPoint, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose, SanType,
};
use time::OffsetDateTime;

use crate::errors::{CaError, Result};
use crate::keys;
use crate::root::RootCa;

pub const LEAF_VALIDITY: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// A second-level domain extraction, matching `utils.get_base_domain`:
/// `sub.example.com` -> `example.com`, `example.com` -> `example.com`.
pub fn base_domain_of(domain: &str) -> String {
    let lower = domain.to_lowercase();
    let parts: Vec<&str> = lower.split('.').collect();
    if parts.len() > 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        lower
    }
}

pub struct IssuedLeaf {
    pub cert_pem: String,
    pub key_pem: String,
}

const SEPARATOR: &str = "\n-----LEAF-KEY-SEPARATOR-----\n";

fn cache_key(base_domain: &str, sans: &[String]) -> String {
    let mut all = sans.to_vec();
    for extra in ALWAYS_APPEND_DOMAIN_NAMES {
        all.push((*extra).to_string());
    }
    format!("{}:{}", base_domain, all.join(","))
}

/// Returns a leaf certificate (and usable private key) for `base_domain`
/// covering `sans`, issuing and caching a new one on a cache miss.
pub async fn get_or_issue_leaf(
    cache: &CacheStore,
    ca: &RootCa,
    strategy: LeafKeyStrategy,
    crl_distribution_url: &str,
    base_domain: &str,
    sans: &[String],
) -> Result<IssuedLeaf> {
    let key = cache_key(base_domain, sans);

    if let Some(bytes) = cache.lookup(CacheKind::Certificate, &key).await? {
        let text = String::from_utf8_lossy(&bytes);
        if let Some((cert_pem, key_pem)) = text.split_once(SEPARATOR) {
            return Ok(IssuedLeaf {
                cert_pem: cert_pem.to_string(),
                key_pem: key_pem.to_string(),
            });
        }
    }

    let issued = issue_leaf(ca, strategy, crl_distribution_url, base_domain, sans)?;
    let blob = format!("{}{}{}", issued.cert_pem, SEPARATOR, issued.key_pem);
    cache.store(CacheKind::Certificate, &key, blob.as_bytes()).await?;

    Ok(issued)
}

/// Issues a fresh leaf certificate directly, bypassing the cache.
pub fn issue_leaf(
    ca: &RootCa,
    strategy: LeafKeyStrategy,
    crl_distribution_url: &str,
    base_domain: &str,
    sans: &[String],
) -> Result<IssuedLeaf> {
    let mut all_sans = sans.to_vec();
    for extra in ALWAYS_APPEND_DOMAIN_NAMES {
        all_sans.push((*extra).to_string());
    }

    let (leaf_key, leaf_key_pem) = match strategy {
        LeafKeyStrategy::ReuseRootKey => (ca.key_pair.clone(), ca.key_pem.clone()),
        LeafKeyStrategy::FreshPerLeaf => {
            let (pem, key) = keys::generate_rsa_keypair()?;
            (key, pem)
        }
    };

    let mut params = CertificateParams::new(Vec::<String>::new()).map_err(CaError::CertBuild)?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, base_domain);
    params.distinguished_name = dn;
    params.is_ca = IsCa::NoCa;

    params.subject_alt_names = all_sans
        .iter()
        .map(|s| parse_san(s))
        .collect::<Result<Vec<_>>>()?;

    params.crl_distribution_points = vec![CrlDistributionPoint {
        uris: vec![crl_distribution_url.to_string()],
    }];

    params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + LEAF_VALIDITY;

    let cert = params
        .signed_by(&leaf_key, &ca.cert, &ca.key_pair)
        .map_err(CaError::CertBuild)?;

    Ok(IssuedLeaf {
        cert_pem: cert.pem(),
        key_pem: leaf_key_pem,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn base_domain_of_keeps_last_two_labels() {
        assert_eq!(base_domain_of("sub.example.com"), "example.com");
        assert_eq!(base_domain_of("a.b.c.example.com"), "example.com");
        assert_eq!(base_domain_of("example.com"), "example.com");
    }

    #[test]
    fn base_domain_of_handles_bare_host_with_fewer_than_two_labels() {
        assert_eq!(base_domain_of("localhost"), "localhost");
    }

    #[test]
    fn base_domain_of_lowercases() {
        assert_eq!(base_domain_of("SUB.EXAMPLE.COM"), "example.com");
    }

    #[test]
    fn base_domain_of_is_idempotent() {
        for host in ["sub.example.com", "example.com", "a.b.c.example.com", "localhost"] {
            let once = base_domain_of(host);
            let twice = base_domain_of(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn cache_key_appends_always_append_domains_and_joins_with_commas() {
        let key = cache_key("example.com", &["example.com".to_string(), "*.example.com".to_string()]);
        assert_eq!(key, "example.com:example.com,*.example.com");
    }
}

fn parse_san(s: &str) -> Result<SanType> {
    if let Ok(ip) = s.parse::<std::net::IpAddr>() {
        Ok(SanType::IpAddress(ip))
    } else {
        rcgen::Ia5String::try_from(s.to_string())
            .map(SanType::DnsName)
            .map_err(|_| CaError::CertBuild(rcgen::Error::InvalidNameType))
    }
}

