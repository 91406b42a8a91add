//! The CA: root certificate management, leaf issuance, and CRL generation
//! for MITM TLS interception. See `cert_handler.py` / `generate_cert.py` /
//! `crl_server.py` for the behavior this generalizes.

mod crl;
mod errors;
mod keys;
mod leaf;
mod root;

pub use crl::{regenerate as regenerate_crl, CRL_VALIDITY};
pub use errors::{CaError, Result};
pub use leaf::{base_domain_of, get_or_issue_leaf, issue_leaf, IssuedLeaf, LEAF_VALIDITY};
pub use root::{default_paths, RootCa, ROOT_COMMON_NAME, ROOT_VALIDITY};
