//! `filter_transfer_headers`, grounded in `utils.py`: `Transfer-Encoding`
//! and `Content-Encoding` are re-derived by the proxy itself, so any
//! upstream value must be dropped before forwarding.

use crate::headers::HeaderMap;

const TRANSFER_RELATED: &[&str] = &["Transfer-Encoding", "Content-Encoding"];

pub fn filter_transfer_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers.iter() {
        if TRANSFER_RELATED.contains(&name) {
            continue;
        }
        filtered.insert(name, value);
    }
    filtered
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn drops_transfer_and_content_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/plain");
        headers.insert("Transfer-Encoding", "chunked");
        headers.insert("Content-Encoding", "gzip");

        let filtered = filter_transfer_headers(&headers);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("Content-Type"), Some("text/plain"));
    }
}
