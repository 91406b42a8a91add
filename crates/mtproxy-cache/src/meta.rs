//! Shard addressing and the `.meta` line format.
//!
//! Grounded in `cache_handler.py`: shard name is `sha256_hex(kind_label "#"
//! name)`; `.meta` is a line-oriented, tab-separated table of five fields
//! per entry. The short id is the smallest 16-bit value (rendered as four
//! lowercase hex digits) not already used within the shard.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::errors::{CacheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    WebFile,
    Certificate,
}

impl CacheKind {
    pub fn label(self) -> &'static str {
        match self {
            CacheKind::WebFile => "WebFile",
            CacheKind::Certificate => "Certificate",
        }
    }

    fn numeric(self) -> u8 {
        match self {
            CacheKind::WebFile => 1,
            CacheKind::Certificate => 2,
        }
    }

    fn from_numeric(n: u8) -> Option<Self> {
        match n {
            1 => Some(CacheKind::WebFile),
            2 => Some(CacheKind::Certificate),
            _ => None,
        }
    }
}

/// `sha256_hex(kind_label + "#" + name)`, the shard directory name.
pub fn shard_key(kind: CacheKind, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.label().as_bytes());
    hasher.update(b"#");
    hasher.update(name.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    pub id: u16,
    pub kind: CacheKind,
    pub name: String,
    pub last_hit: u64,
    pub size: u64,
}

impl MetaRecord {
    pub fn id_hex(&self) -> String {
        format!("{:04x}", self.id)
    }
}

/// Parses the `.meta` file contents. Blank lines are ignored; anything else
/// that isn't a well-formed five-field tab-separated line is an error so a
/// corrupted shard fails loudly rather than silently dropping entries.
pub fn parse_meta(shard: &str, text: &str) -> Result<Vec<MetaRecord>> {
    let mut records = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 5 {
            return Err(CacheError::MalformedMeta {
                shard: shard.to_string(),
                line: line.to_string(),
            });
        }
        let malformed = || CacheError::MalformedMeta {
            shard: shard.to_string(),
            line: line.to_string(),
        };
        let id = u16::from_str_radix(fields[0], 16).map_err(|_| malformed())?;
        let kind_numeric: u8 = fields[1].parse().map_err(|_| malformed())?;
        let kind = CacheKind::from_numeric(kind_numeric).ok_or_else(malformed)?;
        let last_hit: u64 = fields[3].parse().map_err(|_| malformed())?;
        let size: u64 = fields[4].parse().map_err(|_| malformed())?;
        records.push(MetaRecord {
            id,
            kind,
            name: fields[2].to_string(),
            last_hit,
            size,
        });
    }
    Ok(records)
}

pub fn serialize_meta(records: &[MetaRecord]) -> String {
    records
        .iter()
        .map(|r| {
            format!(
                "{}\t{}\t{}\t{}\t{}",
                r.id_hex(),
                r.kind.numeric(),
                r.name,
                r.last_hit,
                r.size
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Smallest unused 16-bit id in the shard. 65535 entries per shard is a
/// hard cap, not a soft one — the source's "64-bit" framing was
/// aspirational but only ever used two id bytes.
pub fn next_available_id(shard: &str, records: &[MetaRecord]) -> Result<u16> {
    let used: HashSet<u16> = records.iter().map(|r| r.id).collect();
    (0u32..=u16::MAX as u32)
        .map(|i| i as u16)
        .find(|id| !used.contains(id))
        .ok_or_else(|| CacheError::ShardFull {
            shard: shard.to_string(),
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shard_key_matches_sha256_of_label_hash_name() {
        let expected = {
            let mut hasher = Sha256::new();
            hasher.update(b"WebFile#http://example.com/x");
            hex::encode(hasher.finalize())
        };
        assert_eq!(
            shard_key(CacheKind::WebFile, "http://example.com/x"),
            expected
        );
    }

    #[test]
    fn round_trips_through_serialize_and_parse() {
        let records = vec![
            MetaRecord {
                id: 0,
                kind: CacheKind::WebFile,
                name: "a".to_string(),
                last_hit: 100,
                size: 10,
            },
            MetaRecord {
                id: 1,
                kind: CacheKind::Certificate,
                name: "example.com:example.com,*.example.com".to_string(),
                last_hit: 200,
                size: 20,
            },
        ];
        let text = serialize_meta(&records);
        let parsed = parse_meta("shard", &text).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let parsed = parse_meta("shard", "\n\n0000\t1\tname\t1\t2\n\n").unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(parse_meta("shard", "not-enough-fields\t1").is_err());
    }

    #[test]
    fn next_available_id_picks_smallest_gap() {
        let records: Vec<MetaRecord> = (0u16..3)
            .map(|id| MetaRecord {
                id,
                kind: CacheKind::WebFile,
                name: format!("{id}"),
                last_hit: 0,
                size: 0,
            })
            .collect();
        assert_eq!(next_available_id("shard", &records).unwrap(), 3);
    }

    #[test]
    fn next_available_id_reuses_freed_slot() {
        let records = vec![MetaRecord {
            id: 0,
            kind: CacheKind::WebFile,
            name: "a".to_string(),
            last_hit: 0,
            size: 0,
        }];
        assert_eq!(next_available_id("shard", &records).unwrap(), 1);
    }
}
