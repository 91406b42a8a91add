//! Response status-line + header synthesis and the cache admission key's
//! canonical header digest.

use crate::headers::HeaderMap;

pub fn synthesize_status_line(version: &str, status: u16, reason: &str) -> String {
    format!("{version} {status} {reason}\r\n")
}

/// Renders `headers` as CRLF-terminated `Name: value` lines followed by the
/// blank-line terminator, ready to prepend a body to.
pub fn synthesize_headers(headers: &HeaderMap) -> String {
    let mut out = String::new();
    for (name, value) in headers.iter() {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out
}

pub fn content_range_header(start: u64, end: u64, total: u64) -> String {
    format!("bytes {start}-{end}/{total}")
}

/// The cache admission key's header component: sorted lowercased header
/// names, `Range` omitted, `name:value` joined by `\n` — a stable
/// replacement for the source's language-dependent `str(headers)` digest.
pub fn canonical_header_digest(headers: &HeaderMap) -> String {
    let mut pairs: Vec<(String, &str)> = headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("range"))
        .map(|(name, value)| (name.to_lowercase(), value))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
        .into_iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn digest_omits_range_and_sorts_by_lowercase_name() {
        let mut headers = HeaderMap::new();
        headers.insert("Range", "bytes=0-10");
        headers.insert("User-Agent", "test");
        headers.insert("Accept", "*/*");

        assert_eq!(
            canonical_header_digest(&headers),
            "accept:*/*\nuser-agent:test"
        );
    }

    #[test]
    fn status_line_is_crlf_terminated() {
        assert_eq!(
            synthesize_status_line("HTTP/1.1", 200, "OK"),
            "HTTP/1.1 200 OK\r\n"
        );
    }
}
