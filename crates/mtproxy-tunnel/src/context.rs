//! The state every connection task shares: the single immutable
//! [`mtproxy_config::RuntimeConfig`] (a collapse of the source's
//! module-level mutable flags), the cache, the CA, the downloader, and the
//! history registry. Built once at startup and handed around behind an
//! [`Arc`] — never a mutable global.

use std::sync::Arc;
use std::time::Duration;

use mtproxy_ca::RootCa;
use mtproxy_cache::CacheStore;
use mtproxy_config::{RuntimeConfig, HEAD_PROBE_TIMEOUT};
use mtproxy_downloader::Downloader;
use mtproxy_history::HistoryRegistry;

pub struct ProxyState {
    pub config: Arc<RuntimeConfig>,
    pub cache: CacheStore,
    pub ca: Arc<RootCa>,
    pub downloader: Arc<Downloader>,
    pub history: Arc<HistoryRegistry>,
    /// Used only for the synchronous HEAD probe ahead of interception:
    /// no redirects, a fixed timeout.
    pub head_client: reqwest::Client,
}

impl ProxyState {
    pub fn new(
        config: Arc<RuntimeConfig>,
        cache: CacheStore,
        ca: Arc<RootCa>,
        downloader: Arc<Downloader>,
        history: Arc<HistoryRegistry>,
    ) -> reqwest::Result<Arc<Self>> {
        let head_client = build_head_client(HEAD_PROBE_TIMEOUT)?;
        Ok(Arc::new(Self {
            config,
            cache,
            ca,
            downloader,
            history,
            head_client,
        }))
    }
}

fn build_head_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
}
