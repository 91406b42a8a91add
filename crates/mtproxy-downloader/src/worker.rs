//! A single chunk fetch with retry/backoff, grounded in `downloader.py`'s
//! `download_chunk`.

use std::time::Duration;

use bytes::Bytes;
use mtproxy_config::DOWNLOADER_MAX_RETRIES;
use mtproxy_http::HeaderMap;
use tracing::warn;

use crate::errors::{DownloaderError, Result};

pub async fn fetch_chunk(
    client: &reqwest::Client,
    url: &str,
    headers: &HeaderMap,
    start: u64,
    end: u64,
) -> Result<Bytes> {
    let mut attempt = 0u32;
    loop {
        match try_fetch_chunk(client, url, headers, start, end).await {
            Ok(bytes) => return Ok(bytes),
            Err(err) if attempt < DOWNLOADER_MAX_RETRIES => {
                attempt += 1;
                let backoff = Duration::from_secs(2u64.saturating_pow(attempt));
                warn!(
                    url,
                    start,
                    end,
                    attempt,
                    error = %err,
                    "chunk fetch failed, retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn try_fetch_chunk(
    client: &reqwest::Client,
    url: &str,
    headers: &HeaderMap,
    start: u64,
    end: u64,
) -> Result<Bytes> {
    let mut request = client.get(url).header("Range", format!("bytes={start}-{end}"));
    for (name, value) in headers.iter() {
        if name.eq_ignore_ascii_case("range") {
            continue;
        }
        request = request.header(name, value);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloaderError::BadStatus {
            status: status.as_u16(),
            start,
            end,
        });
    }

    let expected = end - start + 1;
    let bytes = response.bytes().await?;
    if bytes.len() as u64 != expected {
        return Err(DownloaderError::LengthMismatch {
            start,
            end,
            expected,
            got: bytes.len() as u64,
        });
    }

    Ok(bytes)
}

/// Builds the `reqwest::Client` used for ranged chunk fetches: no
/// redirect-following (a 3xx mid-download is an error; redirects must
/// already be resolved at HEAD time), fixed connect/read timeouts.
pub fn build_client(
    connect_timeout: Duration,
    read_timeout: Duration,
) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(connect_timeout)
        .timeout(read_timeout)
        .build()
}
