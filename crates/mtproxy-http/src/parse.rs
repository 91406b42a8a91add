//! Request-line and header parsing, grounded in `utils.py`'s `decode_header`:
//! UTF-8 with an ISO-8859-1 fallback, and a Host fallback chain of
//! `Host` / `X-Forwarded-Host` / `X-Host`.

use crate::errors::{HttpError, Result};
use crate::headers::HeaderMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    pub target: String,
    pub absolute_url: String,
    pub version: String,
    pub headers: HeaderMap,
    /// Byte offset of the first byte after the header terminator.
    pub consumed: usize,
}

/// Finds the header/body boundary (`"\r\n\r\n"` or `"\n\n"`), returning the
/// offset just past it.
pub fn find_header_boundary(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = find_subslice(buf, b"\r\n\r\n") {
        return Some(pos + 4);
    }
    find_subslice(buf, b"\n\n").map(|pos| pos + 2)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Decodes `bytes` as UTF-8, falling back to ISO-8859-1 (a direct
/// byte-to-codepoint mapping) on failure so no well-formed header byte
/// stream is ever rejected outright.
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Parses a complete header block (request line + header lines, no leading
/// body bytes) ending at `data[..boundary]`. `is_tls` selects the scheme
/// used to build an absolute URL from a relative target.
pub fn parse_request(data: &[u8], is_tls: bool) -> Result<ParsedRequest> {
    let boundary = find_header_boundary(data).ok_or(HttpError::IncompleteHeader)?;
    let text = decode_header_bytes(&data[..boundary]);
    let normalized = text.replace("\r\n", "\n");
    let mut lines = normalized.split('\n');

    let first_line = lines.next().unwrap_or("");
    let mut parts = first_line.split_whitespace();
    let method = parts.next();
    let target = parts.next();
    let version = parts.next();
    let (method, target, version) = match (method, target, version) {
        (Some(m), Some(t), Some(v)) => (m.to_string(), t.to_string(), v.to_string()),
        _ => return Err(HttpError::BadRequestLine(first_line.to_string())),
    };

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::BadHeaderLine(line.to_string()))?;
        headers.insert(name.trim(), value.trim());
    }

    let absolute_url = resolve_absolute_url(&target, is_tls, &headers)?;

    Ok(ParsedRequest {
        method,
        target,
        absolute_url,
        version,
        headers,
        consumed: boundary,
    })
}

fn resolve_absolute_url(target: &str, is_tls: bool, headers: &HeaderMap) -> Result<String> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(target.to_string());
    }

    let host = headers
        .get("Host")
        .or_else(|| headers.get("X-Forwarded-Host"))
        .or_else(|| headers.get("X-Host"))
        .ok_or(HttpError::NoHost)?;

    let scheme = if is_tls { "https" } else { "http" };
    Ok(format!("{scheme}://{host}{target}"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_absolute_target() {
        let raw = b"GET http://example.com/a HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let parsed = parse_request(raw, false).unwrap();
        assert_eq!(parsed.method, "GET");
        assert_eq!(parsed.absolute_url, "http://example.com/a");
    }

    #[test]
    fn builds_absolute_url_from_host_header_over_tls() {
        let raw = b"GET /a HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let parsed = parse_request(raw, true).unwrap();
        assert_eq!(parsed.absolute_url, "https://example.com/a");
    }

    #[test]
    fn falls_back_to_x_forwarded_host() {
        let raw = b"GET /a HTTP/1.1\r\nX-Forwarded-Host: example.com\r\n\r\n";
        let parsed = parse_request(raw, false).unwrap();
        assert_eq!(parsed.absolute_url, "http://example.com/a");
    }

    #[test]
    fn missing_host_is_an_error() {
        let raw = b"GET /a HTTP/1.1\r\n\r\n";
        assert_eq!(parse_request(raw, false).unwrap_err(), HttpError::NoHost);
    }

    #[test]
    fn incomplete_header_reports_need_more_data() {
        let raw = b"GET /a HTTP/1.1\r\nHost: example.com\r\n";
        assert_eq!(
            parse_request(raw, false).unwrap_err(),
            HttpError::IncompleteHeader
        );
    }

    #[test]
    fn non_utf8_bytes_fall_back_to_latin1() {
        let mut raw = b"GET /a HTTP/1.1\r\nHost: example.com\r\nX-Note: ".to_vec();
        raw.push(0xE9); // Latin-1 'e acute', invalid standalone UTF-8
        raw.extend_from_slice(b"\r\n\r\n");
        let parsed = parse_request(&raw, false).unwrap();
        assert_eq!(parsed.headers.get("X-Note"), Some("\u{e9}"));
    }
}
