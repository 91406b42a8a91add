//! The synchronous HEAD probe that runs ahead of every interception
//! decision: same headers the client sent, no redirects, a 10 s timeout.

use mtproxy_http::HeaderMap;

use crate::errors::Result;

pub struct HeadProbe {
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
}

impl HeadProbe {
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("Content-Length")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v >= 0)
            .map(|v| v as u64)
    }

    /// `full_length` out of a `Content-Range: bytes start-end/total` value.
    pub fn content_range_total(&self) -> Option<u64> {
        let value = self.headers.get("Content-Range")?;
        let (_, total) = value.rsplit_once('/')?;
        total.parse().ok()
    }
}

pub async fn probe_head(client: &reqwest::Client, url: &str, headers: &HeaderMap) -> Result<HeadProbe> {
    let mut request = client.head(url);
    for (name, value) in headers.iter() {
        request = request.header(name, value);
    }

    let response = request.send().await?;
    let status = response.status();
    let reason = status.canonical_reason().unwrap_or("").to_string();

    let mut out = HeaderMap::new();
    for (name, value) in response.headers() {
        if let Ok(text) = value.to_str() {
            out.insert(name.as_str(), text);
        }
    }

    Ok(HeadProbe {
        status: status.as_u16(),
        reason,
        headers: out,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn content_length_rejects_negative_value() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Length", "-1");
        let probe = HeadProbe {
            status: 200,
            reason: "OK".into(),
            headers,
        };
        assert_eq!(probe.content_length(), None);
    }

    #[test]
    fn content_range_total_reads_the_suffix() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Range", "bytes 0-99/20971520");
        let probe = HeadProbe {
            status: 206,
            reason: "Partial Content".into(),
            headers,
        };
        assert_eq!(probe.content_range_total(), Some(20_971_520));
    }
}
