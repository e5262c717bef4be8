//! NoloDB Server Binary
//!
//! Opens the storage engine and serves the record API over HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use nolodb::config::FileConfig;
use nolodb::network::Server;
use nolodb::Engine;
use tracing_subscriber::{fmt, EnvFilter};

/// NoloDB Server
#[derive(Parser, Debug)]
#[command(name = "nolodb-server")]
#[command(about = "Record server with a log-structured storage engine")]
#[command(version)]
struct Args {
    /// Configuration file (TOML, `[server]` table)
    #[arg(short, long, default_value = "nolodb.toml")]
    config: PathBuf,

    /// Data directory (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Listen address host:port (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Live memtable entry limit before it is frozen and flushed
    #[arg(short = 'm', long)]
    memtable_entries: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("NOLO_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info,nolodb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let mut config = FileConfig::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?
        .server;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(entries) = args.memtable_entries {
        config.memtable_entry_limit = entries;
    }
    config.validate()?;

    tracing::info!("NoloDB Server v{}", nolodb::VERSION);
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Listen address: {}", config.listen_addr);

    let engine = Arc::new(
        Engine::open(config.clone())
            .with_context(|| format!("opening engine in {}", config.data_dir.display()))?,
    );
    tracing::info!("Engine initialized successfully");

    Server::new(config, Arc::clone(&engine)).run().await?;

    // Handlers are gone; persist whatever is still in memory.
    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.close()?,
        Err(engine) => engine.flush()?,
    }
    tracing::info!("Server stopped");
    Ok(())
}
