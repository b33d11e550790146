//! BlockFS Data Node Daemon
//!
//! Serves blocks to the cluster: binds the RPC port, answers
//! ReadBlock/WriteBlock/DeleteBlock/GetBlockInfo/Heartbeat, and runs the
//! background dirty-page flusher when the write-back cache is enabled.
//!
//! # Usage
//!
//! ```bash
//! blockfsd --id datanode-1 --blocks ./blocks --port 50051 \
//!          --cache-enable true --cache-size 4096 --cache-policy lru
//! ```
//!
//! A TOML file can provide the same settings via `--config`; explicit
//! flags override the file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use blockfs::config::ServerConfig;
use blockfs::constants::STATS_REPORT_INTERVAL_SECS;
use blockfs::metadata::BlockManager;
use blockfs::rpc::{DataNodeService, RpcServer};
use blockfs::server::signals::setup_signal_handlers;
use blockfs::server::BackgroundFlusher;

/// BlockFS data node
#[derive(Parser, Debug)]
#[command(name = "blockfsd")]
#[command(about = "BlockFS data node: block storage with a write-back page cache")]
struct Args {
    /// TOML configuration file; explicit flags override it
    #[arg(long)]
    config: Option<String>,

    /// Datanode identifier reported on heartbeat
    #[arg(long)]
    id: Option<String>,

    /// Blocks directory
    #[arg(long)]
    blocks: Option<PathBuf>,

    /// RPC listen port
    #[arg(long)]
    port: Option<u16>,

    /// Enable the write-back page cache
    #[arg(long)]
    cache_enable: Option<bool>,

    /// Cache capacity in pages
    #[arg(long)]
    cache_size: Option<u64>,

    /// Cache eviction policy (lru or lfu)
    #[arg(long)]
    cache_policy: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn build_config(args: &Args) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    if let Some(id) = &args.id {
        config.node.node_id = id.clone();
    }
    if let Some(blocks) = &args.blocks {
        config.node.blocks_dir = blocks.clone();
    }
    if let Some(port) = args.port {
        config.network.listen_port = port;
    }
    if let Some(enabled) = args.cache_enable {
        config.cache.enabled = enabled;
    }
    if let Some(size) = args.cache_size {
        config.cache.capacity_pages = size;
    }
    if let Some(policy) = &args.cache_policy {
        config.cache.policy = policy.clone();
    }
    if let Some(level) = &args.log_level {
        config.node.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn main() {
    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    blockfs::logging::init_with_hostname(&config.node.log_level);

    tracing::info!("Starting BlockFS data node");
    tracing::info!("Node ID: {}", config.node.node_id);
    tracing::info!("Blocks directory: {}", config.node.blocks_dir.display());
    tracing::info!("Listen address: {}", config.bind_addr());
    tracing::info!(
        "Cache: {} ({} pages, {} policy)",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.capacity_pages,
        config.cache.policy,
    );

    if let Err(e) = run(config) {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }

    tracing::info!("Server shutdown complete");
}

fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let policy = config.cache_policy()?;

    let manager = BlockManager::new(
        &config.node.blocks_dir,
        config.cache.enabled,
        config.cache.capacity_pages,
        policy,
    )?;
    let service = Arc::new(DataNodeService::new(config.node.node_id.clone(), manager));

    let running = Arc::new(AtomicBool::new(true));
    setup_signal_handlers(running.clone());

    // Periodic statistics snapshot for monitoring.
    {
        let service = Arc::clone(&service);
        let running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("stats-reporter".to_string())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_secs(STATS_REPORT_INTERVAL_SECS));
                    if running.load(Ordering::Relaxed) {
                        tracing::info!("{}", service.statistics());
                    }
                }
            })?;
    }

    // Background dirty page flusher, only meaningful with a cache.
    let flusher = if config.cache.enabled {
        Some(BackgroundFlusher::start(
            Arc::clone(&service),
            Duration::from_millis(config.cache.flush_interval_ms),
            config.cache.flush_threshold_ratio,
        )?)
    } else {
        None
    };

    let server = RpcServer::bind(&config.bind_addr(), Arc::clone(&service), running.clone())?;
    tracing::info!("Press Ctrl+C to shut down");
    server.run()?;

    // Shutdown order: stop accepting (done), join the flusher, then drain
    // dirty pages so every committed write is on disk.
    if let Some(flusher) = flusher {
        flusher.shutdown();
    }
    let flushed = service.flush_dirty_pages();
    if flushed > 0 {
        tracing::info!(flushed, "flushed remaining dirty pages");
    }
    tracing::info!("{}", service.statistics());

    Ok(())
}
