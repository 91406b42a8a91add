//! Administrative companion to `mtproxy`: generates the root CA and its
//! initial CRL, and clears the on-disk cache. Split from the main binary the
//! way `generate_cert.py` stands apart from `proxy_server.py` in the
//! source — CA material is provisioned once, out of band from serving
//! traffic.

use std::path::PathBuf;

use clap::Parser;
use mtproxy_ca::RootCa;
use mtproxy_cli_common::{init_logging, LogArgs, OrBail};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "mtproxy-admin", about = "Administrative companion to mtproxy")]
struct Cli {
    /// Generate the root CA and its CRL. Fails if CA material already exists.
    #[arg(long = "generate-ca")]
    generate_ca: bool,

    /// Delete every entry in the on-disk cache.
    #[arg(long = "clear-cache")]
    clear_cache: bool,

    /// Directory holding CA material, the cache, history logs, and `mfc.yaml`.
    #[arg(long = "state-dir")]
    state_dir: Option<PathBuf>,

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

    if !cli.generate_ca && !cli.clear_cache {
        print_status(&state_dir);
        print_help();
        return;
    }

    if cli.generate_ca {
        generate_ca(&state_dir);
    }

    if cli.clear_cache {
        clear_cache(&state_dir);
    }
}

fn generate_ca(state_dir: &PathBuf) {
    let (cert_path, key_path) = mtproxy_ca::default_paths(state_dir);
    let ca = RootCa::generate(&cert_path, &key_path).or_bail("failed to generate CA material");

    let crl_path = state_dir.join(mtproxy_config::CRL_FILE);
    mtproxy_ca::regenerate_crl(&ca, &crl_path).or_bail("failed to generate the initial CRL");

    info!(cert = %cert_path.display(), key = %key_path.display(), crl = %crl_path.display(), "generated CA and CRL");
}

fn clear_cache(state_dir: &PathBuf) {
    let cache_dir = state_dir.join(mtproxy_config::CACHE_DIR);
    match std::fs::remove_dir_all(&cache_dir) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::error!(error = %err, dir = %cache_dir.display(), "failed to clear cache");
            std::process::exit(1);
        }
    }
    std::fs::create_dir_all(&cache_dir).or_bail("failed to recreate cache directory");
    info!(dir = %cache_dir.display(), "cache cleared");
}

fn print_status(state_dir: &PathBuf) {
    let (cert_path, key_path) = mtproxy_ca::default_paths(state_dir);
    let ca_present = cert_path.exists() && key_path.exists();
    let crl_present = state_dir.join(mtproxy_config::CRL_FILE).exists();
    let cache_dir = state_dir.join(mtproxy_config::CACHE_DIR);
    let cache_entries = std::fs::read_dir(&cache_dir).map(|entries| entries.count()).unwrap_or(0);

    println!("state dir:   {}", state_dir.display());
    println!("CA material: {}", if ca_present { "present" } else { "missing" });
    println!("CRL:         {}", if crl_present { "present" } else { "missing" });
    println!("cache:       {cache_entries} shard(s) in {}", cache_dir.display());
}

fn print_help() {
    println!();
    println!("Usage: mtproxy-admin [--generate-ca] [--clear-cache] [--state-dir <DIR>]");
    println!();
    println!("  --generate-ca   generate the root CA and its CRL (fails if they already exist)");
    println!("  --clear-cache   remove every entry from the on-disk cache");
    println!("  --state-dir     directory holding CA material, the cache, and mfc.yaml");
}
