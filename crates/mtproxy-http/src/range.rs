//! `Range: bytes=L-R?` parsing. Only a single range is supported; a
//! multi-range request (`bytes=0-10,20-30`) is rejected.

use crate::errors::{HttpError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: u64,
    pub end: Option<u64>,
}

pub fn parse_range_header(value: &str) -> Result<RangeRequest> {
    if value.contains(',') {
        return Err(HttpError::MultiRange);
    }

    let spec = value
        .strip_prefix("bytes=")
        .ok_or_else(|| HttpError::BadRange(value.to_string()))?;

    let (start_str, end_str) = spec
        .split_once('-')
        .ok_or_else(|| HttpError::BadRange(value.to_string()))?;

    let start: u64 = start_str
        .parse()
        .map_err(|_| HttpError::BadRange(value.to_string()))?;

    let end = if end_str.is_empty() {
        None
    } else {
        Some(
            end_str
                .parse()
                .map_err(|_| HttpError::BadRange(value.to_string()))?,
        )
    };

    Ok(RangeRequest { start, end })
}

/// Resolves an open-ended range (`bytes=L-`) against a known content
/// length: `R = L + content_length - 1` when absent.
pub fn resolve_end(range: RangeRequest, content_length: u64) -> u64 {
    range.end.unwrap_or(range.start + content_length - 1)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_closed_range() {
        let r = parse_range_header("bytes=1048576-3145727").unwrap();
        assert_eq!(r.start, 1_048_576);
        assert_eq!(r.end, Some(3_145_727));
    }

    #[test]
    fn parses_open_ended_range() {
        let r = parse_range_header("bytes=1048576-").unwrap();
        assert_eq!(r.start, 1_048_576);
        assert_eq!(r.end, None);
        assert_eq!(resolve_end(r, 2_097_152), 1_048_576 + 2_097_152 - 1);
    }

    #[test]
    fn rejects_multi_range() {
        assert_eq!(
            parse_range_header("bytes=0-10,20-30").unwrap_err(),
            HttpError::MultiRange
        );
    }

    #[test]
    fn rejects_missing_units_prefix() {
        assert!(parse_range_header("0-10").is_err());
    }
}
