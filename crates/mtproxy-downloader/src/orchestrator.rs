//! Orchestrates a ranged download: schedules chunks, runs the worker pool,
//! and streams completed chunks back to the consumer strictly in order.
//! Grounded in `downloader.py`'s `improved_multi_thread_download`, reshaped
//! around a single mutex protecting the schedule array and an ordered,
//! non-buffering consumer contract.

use std::sync::Arc;

use bytes::Bytes;
use mtproxy_cache::{CacheKind, CacheStore};
use mtproxy_config::{
    DOWNLOADER_CONNECT_TIMEOUT, DOWNLOADER_MAX_CHUNK_SIZE, DOWNLOADER_MAX_THREADS,
    DOWNLOADER_READ_TIMEOUT,
};
use mtproxy_http::{canonical_header_digest, HeaderMap};
use tokio::sync::{mpsc, Mutex, Notify, Semaphore};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::schedule::{build_schedule, chunk_size_for, ChunkDescriptor};
use crate::worker::{build_client, fetch_chunk};

pub struct Downloader {
    cache: CacheStore,
    client: reqwest::Client,
    /// Gates `kind=WebFile` cache lookup/admission only. Matches
    /// `cache_handler.py`: the CA's leaf-certificate cache is never subject
    /// to this flag (see `mtproxy-ca`).
    with_cache: bool,
}

/// Bytes delivered to the caller in strict chunk order. Dropping it before
/// exhaustion is a clean cancellation: the worker pool keeps running in the
/// background so a cache-eligible download still completes and gets stored.
pub struct RangeDownload {
    receiver: mpsc::Receiver<Bytes>,
}

impl RangeDownload {
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }
}

impl Downloader {
    pub fn new(cache: CacheStore, with_cache: bool) -> reqwest::Result<Self> {
        let client = build_client(DOWNLOADER_CONNECT_TIMEOUT, DOWNLOADER_READ_TIMEOUT)?;
        Ok(Self { cache, client, with_cache })
    }

    /// Fetches `[l, r]` inclusive of `url`, consulting the cache first under
    /// `kind=WebFile`, key `url#<canonical header digest>#<file_size>`, when
    /// `with_cache` is enabled.
    pub async fn fetch_range(
        &self,
        url: String,
        headers: HeaderMap,
        l: u64,
        r: u64,
    ) -> Result<RangeDownload> {
        let file_size = r - l + 1;
        let cache_key = format!("{url}#{}#{file_size}", canonical_header_digest(&headers));

        if self.with_cache {
            if let Some(bytes) = self.cache.lookup(CacheKind::WebFile, &cache_key).await? {
                debug!(url, file_size, "range download served from cache");
                let (tx, rx) = mpsc::channel(1);
                let _ = tx.send(bytes).await;
                return Ok(RangeDownload { receiver: rx });
            }
        }

        let chunk_size = chunk_size_for(file_size, DOWNLOADER_MAX_THREADS, DOWNLOADER_MAX_CHUNK_SIZE);
        let schedule = Arc::new(Mutex::new(build_schedule(l, r, chunk_size)));
        let notify = Arc::new(Notify::new());
        let total_chunks = schedule.lock().await.len();

        info!(
            url,
            file_size,
            chunk_size,
            total_chunks,
            "starting multi-thread range download"
        );

        let failure: Arc<Mutex<Option<crate::errors::DownloaderError>>> = Arc::new(Mutex::new(None));
        let semaphore = Arc::new(Semaphore::new(DOWNLOADER_MAX_THREADS));

        for idx in 0..total_chunks {
            let client = self.client.clone();
            let url = url.clone();
            let headers = headers.clone();
            let schedule = schedule.clone();
            let notify = notify.clone();
            let failure = failure.clone();
            let semaphore = semaphore.clone();

            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                if failure.lock().await.is_some() {
                    return;
                }

                let (start, end) = {
                    let guard = schedule.lock().await;
                    (guard[idx].start, guard[idx].end)
                };

                match fetch_chunk(&client, &url, &headers, start, end).await {
                    Ok(bytes) => {
                        let mut guard = schedule.lock().await;
                        guard[idx].data = Some(bytes);
                        guard[idx].downloaded = true;
                    }
                    Err(err) => {
                        warn!(url, start, end, error = %err, "chunk terminally failed");
                        let mut slot = failure.lock().await;
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                }
                notify.notify_waiters();
            });
        }

        let (tx, rx) = mpsc::channel(4);
        let cache = self.cache.clone();
        let with_cache = self.with_cache;
        tokio::spawn(stream_in_order(
            schedule,
            notify,
            failure,
            tx,
            cache,
            with_cache,
            cache_key,
            total_chunks,
        ));

        Ok(RangeDownload { receiver: rx })
    }
}

async fn stream_in_order(
    schedule: Arc<Mutex<Vec<ChunkDescriptor>>>,
    notify: Arc<Notify>,
    failure: Arc<Mutex<Option<crate::errors::DownloaderError>>>,
    tx: mpsc::Sender<Bytes>,
    cache: CacheStore,
    with_cache: bool,
    cache_key: String,
    total_chunks: usize,
) {
    let mut full_buffer: Vec<u8> = Vec::new();
    let consumer_alive = std::sync::atomic::AtomicBool::new(true);

    for idx in 0..total_chunks {
        let bytes = loop {
            if failure.lock().await.is_some() {
                warn!("range download aborted, a chunk failed terminally");
                return;
            }

            // Register for notification before inspecting the descriptor: if we
            // checked first and a worker's `notify_waiters` landed between the
            // check and the wait, the wakeup would be lost and we'd hang forever.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let mut guard = schedule.lock().await;
            if guard[idx].downloaded {
                let bytes = guard[idx].data.take().expect("downloaded implies data");
                guard[idx].consumed = true;
                break bytes;
            }
            drop(guard);
            notified.await;
        };

        full_buffer.extend_from_slice(&bytes);

        if consumer_alive.load(std::sync::atomic::Ordering::Relaxed) {
            if tx.send(bytes).await.is_err() {
                consumer_alive.store(false, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }

    if !with_cache {
        return;
    }

    if let Err(err) = cache.store(CacheKind::WebFile, &cache_key, &full_buffer).await {
        debug!(error = %err, "range download not cached (admission refused or io error)");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Parses a minimal `Range: bytes=start-end` request line and header
    /// block off the wire and replies with a 206 slice of `payload`. Good
    /// enough to drive the downloader end to end; not a general HTTP server.
    async fn serve_one_range_request(mut stream: tokio::net::TcpStream, payload: Arc<Vec<u8>>) {
        let mut buf = vec![0u8; 4096];
        let mut filled = 0;
        let header_end = loop {
            let n = stream.read(&mut buf[filled..]).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            filled += n;
            if let Some(pos) = buf[..filled].windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let request = String::from_utf8_lossy(&buf[..header_end]);

        let range_line = request
            .lines()
            .find(|line| line.to_ascii_lowercase().starts_with("range:"))
            .expect("downloader always sends a Range header");
        let spec = range_line.split("bytes=").nth(1).unwrap().trim();
        let (start, end) = spec.split_once('-').unwrap();
        let start: usize = start.parse().unwrap();
        let end: usize = end.parse().unwrap();
        let slice = &payload[start..=end];

        let response = format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
            slice.len(),
            start,
            end,
            payload.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.write_all(slice).await.unwrap();
    }

    #[tokio::test]
    async fn fetch_range_streams_chunks_in_order_and_reassembles_the_original_bytes() {
        let payload: Arc<Vec<u8>> = Arc::new((0u32..200_000).map(|n| (n % 256) as u8).collect());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_payload = payload.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                tokio::spawn(serve_one_range_request(stream, accept_payload.clone()));
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path().join("cache"));
        let downloader = Downloader::new(cache, false).unwrap();

        let url = format!("http://{addr}/payload.bin");
        let mut download = downloader
            .fetch_range(url, HeaderMap::new(), 0, payload.len() as u64 - 1)
            .await
            .unwrap();

        let mut received = Vec::new();
        while let Some(chunk) = download.next_chunk().await {
            received.extend_from_slice(&chunk);
        }

        assert_eq!(received, *payload);
    }
}
