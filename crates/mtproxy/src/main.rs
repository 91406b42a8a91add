//! The main proxy binary: loads CA material and `mfc.yaml`, starts the CRL
//! server, the optional SOCKS5 front door, the cache GC loop, and the
//! connection dispatcher, then waits for `SIGINT`/`SIGTERM` to tear
//! everything down in reverse, matching `proxy_server.py`'s startup/shutdown
//! ordering.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mtproxy_ca::RootCa;
use mtproxy_cache::CacheStore;
use mtproxy_cli_common::{init_logging, LogArgs, OrBail};
use mtproxy_config::{MfcTable, RuntimeConfig};
use mtproxy_downloader::Downloader;
use mtproxy_history::HistoryRegistry;
use mtproxy_tunnel::ProxyState;
use tracing::{error, info, warn};

/// Java truststore password written to `gradle.properties`. Actual JKS
/// truststore generation from the CA's PEM cert is out of scope — Gradle
/// integration is a thin external collaborator here; this is the
/// conventional Java default, kept so the emitted property is consistent
/// across runs.
const GRADLE_TRUSTSTORE_PASSWORD: &str = "changeit";

#[derive(Debug, Parser)]
#[command(name = "mtproxy", about = "MITM HTTP(S) forward proxy")]
struct Cli {
    /// Consult and populate the on-disk cache for large GET responses.
    #[arg(long = "with-cache")]
    with_cache: bool,

    /// Track per-connection byte conversations and dump them to `log/`.
    #[arg(long = "with-history")]
    with_history: bool,

    /// Point Gradle at this proxy via `~/.gradle/gradle.properties` for the
    /// duration of the run, restoring it on shutdown.
    #[arg(long)]
    gradle: bool,

    /// Also listen for SOCKS5 `CONNECT` clients.
    #[arg(long)]
    socks5: bool,

    /// Directory holding CA material, the cache, history logs, and `mfc.yaml`.
    #[arg(long = "state-dir")]
    state_dir: Option<PathBuf>,

    /// Host the proxy, CRL server, and (if enabled) SOCKS5 front door bind.
    #[arg(long = "bind-host", default_value = mtproxy_config::DEFAULT_BIND_HOST)]
    bind_host: String,

    #[command(flatten)]
    log: LogArgs,
}

fn default_state_dir() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    home.join(".mtproxy")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let state_dir = cli.state_dir.clone().unwrap_or_else(default_state_dir);
    std::fs::create_dir_all(&state_dir).or_bail("failed to create state directory");

    let (cert_path, key_path) = mtproxy_ca::default_paths(&state_dir);
    let ca = RootCa::load(&cert_path, &key_path)
        .or_bail("no CA material found; run `mtproxy-admin --generate-ca` first");

    let crl_path = state_dir.join(mtproxy_config::CRL_FILE);
    let crl_pem = std::fs::read_to_string(&crl_path).or_bail("no CRL found; run `mtproxy-admin --generate-ca` first");

    let mfc = MfcTable::load(&state_dir.join(mtproxy_config::MFC_CONFIG_FILE)).or_bail("failed to load mfc.yaml");

    let config = Arc::new(RuntimeConfig {
        with_cache: cli.with_cache,
        with_history: cli.with_history,
        gradle: cli.gradle,
        socks5: cli.socks5,
        bind_host: cli.bind_host.clone(),
        leaf_key_strategy: mtproxy_config::LeafKeyStrategy::default(),
        mfc,
        gradle_properties_path: mtproxy_config::gradle_properties_path(),
    });

    let cache = CacheStore::new(state_dir.join(mtproxy_config::CACHE_DIR));
    let downloader = Arc::new(
        Downloader::new(cache.clone(), config.with_cache).or_bail("failed to build the downloader's http client"),
    );
    let history = Arc::new(HistoryRegistry::new());
    let ca = Arc::new(ca);

    let state = ProxyState::new(config.clone(), cache.clone(), ca, downloader, history.clone())
        .or_bail("failed to build the proxy's shared state");

    tokio::spawn(mtproxy_cache::run_gc_loop(cache.root().to_path_buf()));

    let crl_addr = format!("{}:{}", config.bind_host, mtproxy_config::CRL_SERVER_PORT);
    tokio::spawn(async move {
        let addr: std::net::SocketAddr = crl_addr.parse().expect("bind_host:port is a valid socket address");
        if let Err(err) = mtproxy_crl_server::run(addr, bytes::Bytes::from(crl_pem)).await {
            error!(error = %err, "crl server exited");
        }
    });

    if config.socks5 {
        let socks5_addr = format!("{}:{}", config.bind_host, mtproxy_config::SOCKS5_PORT);
        tokio::spawn(async move {
            if let Err(err) = run_socks5(&socks5_addr).await {
                error!(error = %err, "socks5 listener exited");
            }
        });
    }

    if config.gradle {
        let truststore_path = state_dir.join("truststore.jks");
        mtproxy_gradle::set_gradle_proxies(
            &config.gradle_properties_path,
            &config.bind_host,
            mtproxy_config::PROXY_PORT,
            &truststore_path.to_string_lossy(),
            GRADLE_TRUSTSTORE_PASSWORD,
        )
        .or_bail("failed to set gradle proxies");
    }

    let dispatcher = tokio::spawn(mtproxy_tunnel::run(config.bind_host.clone(), state));

    tokio::select! {
        result = dispatcher => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(error = %err, "proxy dispatcher exited"),
                Err(err) => error!(error = %err, "proxy dispatcher task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    if config.gradle {
        if let Err(err) = mtproxy_gradle::clear_gradle_proxies(&config.gradle_properties_path) {
            warn!(error = %err, "failed to clear gradle proxies on shutdown");
        }
    }

    if config.with_history {
        let traces = history.snapshot();
        let log_dir = mtproxy_history::default_log_dir(&state_dir);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        for sort_by in [mtproxy_history::SortBy::Time, mtproxy_history::SortBy::Size] {
            if let Err(err) = mtproxy_history::dump(&log_dir, now, sort_by, &traces) {
                warn!(error = %err, "failed to dump request history on shutdown");
            }
        }
    }
}

async fn run_socks5(addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "socks5 listening");
    loop {
        let (socket, peer) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(err) = mtproxy_socks5::serve_connection(socket).await {
                warn!(%peer, error = %err, "socks5 connection ended");
            }
        });
    }
}
