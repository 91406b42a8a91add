//! `on_header`: the GET interception decision. Given a complete client
//! request header, decides whether to synthesize a response itself
//! (serving from a pre-staged MFC file or the parallel downloader) or let
//! the caller fall back to a raw tunnel.

use mtproxy_http::{
    canonical_header_digest, content_range_header, filter_transfer_headers, parse_range_header,
    synthesize_headers, synthesize_status_line, HeaderMap, ParsedRequest,
};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::context::ProxyState;
use crate::errors::Result;
use crate::head_probe::probe_head;

/// The three outcomes of a header-hook decision.
/// `NoPass` only arises from the mid-tunnel re-inspection path (see
/// `connection::reinspect_header`) — a fresh connection's first header
/// never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptDecision {
    Pass,
    CloseDirectly,
    NoPass,
}

/// Runs the full interception decision for `request`, writing a synthesized
/// response to `client` when it chooses to serve the request itself.
/// Network/origin failures degrade to [`InterceptDecision::Pass`] so the
/// client's real GET is given the chance to produce an authoritative
/// error.
pub async fn on_header<W>(
    request: &ParsedRequest,
    client: &mut W,
    state: &ProxyState,
) -> Result<InterceptDecision>
where
    W: tokio::io::AsyncWrite + Unpin + Send + ?Sized,
{
    if request.method != "GET" {
        return Ok(InterceptDecision::Pass);
    }

    if let Some(range_value) = request.headers.get("Range") {
        if range_value.contains(',') {
            debug!(url = %request.absolute_url, "multi-range request, passing through");
            return Ok(InterceptDecision::Pass);
        }
    }

    if state.config.mfc.is_cache_disabled(&request.absolute_url) {
        debug!(url = %request.absolute_url, "mfc marks url cache-disabled, passing through");
        return Ok(InterceptDecision::Pass);
    }

    let probe = match probe_head(&state.head_client, &request.absolute_url, &request.headers).await {
        Ok(probe) => probe,
        Err(err) => {
            warn!(url = %request.absolute_url, error = %err, "origin head probe failed, passing through");
            return Ok(InterceptDecision::Pass);
        }
    };

    let Some(content_length) = probe.content_length() else {
        debug!(url = %request.absolute_url, "origin head has no content-length, passing through");
        return Ok(InterceptDecision::Pass);
    };

    let full_length = probe.content_range_total().unwrap_or(content_length);

    let client_range = match request.headers.get("Range").map(parse_range_header) {
        Some(Ok(range)) => Some(range),
        Some(Err(err)) => {
            debug!(url = %request.absolute_url, error = %err, "unparseable range, passing through");
            return Ok(InterceptDecision::Pass);
        }
        None => None,
    };

    let (l, r) = match client_range {
        Some(range) => (range.start, mtproxy_http::resolve_end(range, content_length)),
        None => (0, content_length.saturating_sub(1)),
    };

    let filtered = filter_transfer_headers(&probe.headers);

    if let Some(path) = state.config.mfc.local_file_for(&request.absolute_url) {
        if let Ok(metadata) = tokio::fs::metadata(&path).await {
            if metadata.len() == full_length {
                serve_local_file(client, &path, &probe, &filtered, l, r, full_length, client_range.is_some())
                    .await?;
                return Ok(InterceptDecision::CloseDirectly);
            }
        }
    }

    if content_length >= mtproxy_config::DOWNLOADER_MULTIPART_THRESHOLD {
        serve_from_downloader(
            client,
            request,
            &probe,
            &filtered,
            l,
            r,
            full_length,
            client_range.is_some(),
            state,
        )
        .await?;
        return Ok(InterceptDecision::CloseDirectly);
    }

    Ok(InterceptDecision::Pass)
}

fn response_headers(
    base: &HeaderMap,
    l: u64,
    r: u64,
    full_length: u64,
    had_client_range: bool,
) -> HeaderMap {
    let mut headers = base.clone();
    headers.insert("Accept-Ranges", "bytes");
    headers.insert("Connection", "keep-alive");
    headers.insert("Content-Length", (r - l + 1).to_string());
    if had_client_range {
        headers.insert("Content-Range", content_range_header(l, r, full_length));
    } else {
        headers.remove("Content-Range");
    }
    headers
}

async fn write_status_and_headers<W>(
    client: &mut W,
    probe: &crate::head_probe::HeadProbe,
    headers: &HeaderMap,
) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin + Send + ?Sized,
{
    let status_line = synthesize_status_line("HTTP/1.1", probe.status, &probe.reason);
    client.write_all(status_line.as_bytes()).await?;
    client.write_all(synthesize_headers(headers).as_bytes()).await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn serve_local_file<W>(
    client: &mut W,
    path: &std::path::Path,
    probe: &crate::head_probe::HeadProbe,
    filtered: &HeaderMap,
    l: u64,
    r: u64,
    full_length: u64,
    had_client_range: bool,
) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin + Send + ?Sized,
{
    let headers = response_headers(filtered, l, r, full_length, had_client_range);
    write_status_and_headers(client, probe, &headers).await?;

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(l)).await?;
    let mut remaining = r - l + 1;
    let mut buf = vec![0u8; 64 * 1024];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = tokio::io::AsyncReadExt::read(&mut file, &mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        client.write_all(&buf[..n]).await?;
        remaining -= n as u64;
    }
    client.write_all(b"\r\n").await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn serve_from_downloader<W>(
    client: &mut W,
    request: &ParsedRequest,
    probe: &crate::head_probe::HeadProbe,
    filtered: &HeaderMap,
    l: u64,
    r: u64,
    full_length: u64,
    had_client_range: bool,
    state: &ProxyState,
) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin + Send + ?Sized,
{
    let headers = response_headers(filtered, l, r, full_length, had_client_range);
    write_status_and_headers(client, probe, &headers).await?;

    debug!(
        url = %request.absolute_url,
        l,
        r,
        digest = %canonical_header_digest(&request.headers),
        "routing through parallel range downloader"
    );

    let mut download = state
        .downloader
        .fetch_range(request.absolute_url.clone(), request.headers.clone(), l, r)
        .await?;

    while let Some(chunk) = download.next_chunk().await {
        client.write_all(&chunk).await?;
    }
    client.write_all(b"\r\n").await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn response_headers_sets_content_range_only_when_client_asked() {
        let base = HeaderMap::new();
        let with_range = response_headers(&base, 10, 19, 100, true);
        assert_eq!(with_range.get("Content-Range"), Some("bytes 10-19/100"));
        assert_eq!(with_range.get("Content-Length"), Some("10"));

        let without_range = response_headers(&base, 0, 99, 100, false);
        assert_eq!(without_range.get("Content-Range"), None);
        assert_eq!(without_range.get("Content-Length"), Some("100"));
    }

    #[test]
    fn response_headers_always_sets_accept_ranges_and_keep_alive() {
        let base = HeaderMap::new();
        let headers = response_headers(&base, 0, 0, 1, false);
        assert_eq!(headers.get("Accept-Ranges"), Some("bytes"));
        assert_eq!(headers.get("Connection"), Some("keep-alive"));
    }
}
