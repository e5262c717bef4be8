//! NoloDB CLI Client
//!
//! Runs client actions against a local engine store and a server list.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nolodb::config::{FileConfig, SyncConfig};
use nolodb::query::{QueryRequest, SortSpec};
use nolodb::sync::{Database, WriteRequest};
use nolodb::{Config, Engine, KeyFlags};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// NoloDB CLI
#[derive(Parser, Debug)]
#[command(name = "nolodb-cli")]
#[command(about = "Local-first client for NoloDB record servers")]
#[command(version)]
struct Args {
    /// Configuration file (TOML, `[sync]` table)
    #[arg(short, long, default_value = "nolodb.toml")]
    config: PathBuf,

    /// Local store directory
    #[arg(long, default_value = "./nolo_local")]
    local_dir: PathBuf,

    /// Server base URL; repeat for mirrors (overrides the config file)
    #[arg(short, long = "server")]
    servers: Vec<String>,

    /// Acting user id
    #[arg(short, long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read a record from the local store
    Read { key: String },

    /// Read a record, reconciling with every server
    ReadAndWait { key: String },

    /// Write a new record (JSON object)
    Write {
        data: String,

        /// Record id or full key
        #[arg(long)]
        key: Option<String>,

        /// Store as a hash record
        #[arg(long)]
        hash: bool,
    },

    /// Merge changes (JSON object) into a record; null removes a field
    Patch { key: String, changes: String },

    /// Delete a record
    Remove {
        key: String,

        /// Also delete the dialog's messages
        #[arg(long)]
        messages: bool,
    },

    /// Query a user's records
    Query {
        /// Condition (JSON object)
        #[arg(default_value = "{}")]
        condition: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        skip: usize,

        /// Sort field, newest/highest first
        #[arg(long)]
        sort_desc: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("NOLO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    let mut sync: SyncConfig = FileConfig::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?
        .sync;
    if !args.servers.is_empty() {
        sync.current_server = None;
        sync.mirrors = args.servers.clone();
    }
    if args.user.is_some() {
        sync.actor = args.user.clone();
    }

    let local = Arc::new(
        Engine::open(Config::builder().data_dir(&args.local_dir).build())
            .with_context(|| format!("opening local store {}", args.local_dir.display()))?,
    );
    let db = Database::new(local.clone(), sync.clone())?;

    let output = run(&db, &sync, args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    // Let background replication finish before exiting.
    db.replicator().wait_idle().await;
    drop(db);
    local.flush()?;
    Ok(())
}

async fn run(db: &Database, sync: &SyncConfig, command: Commands) -> anyhow::Result<Value> {
    Ok(match command {
        Commands::Read { key } => db.read(&key).await?.unwrap_or(Value::Null),
        Commands::ReadAndWait { key } => db.read_and_wait(&key).await?,
        Commands::Write { data, key, hash } => {
            let data: Value = serde_json::from_str(&data).context("data must be JSON")?;
            let mut request = WriteRequest::new(data);
            if hash {
                request = request.flags(KeyFlags::hash());
            }
            if let Some(key) = key {
                request = request.custom_key(key);
            }
            db.write(request).await?
        }
        Commands::Patch { key, changes } => {
            let changes: Value = serde_json::from_str(&changes).context("changes must be JSON")?;
            db.patch(&key, changes).await?
        }
        Commands::Remove { key, messages } => {
            let removed = if messages {
                db.remove_messages(&key).await?
            } else {
                db.remove(&key).await?
            };
            serde_json::json!({ "dbKey": removed.db_key })
        }
        Commands::Query {
            condition,
            limit,
            skip,
            sort_desc,
        } => {
            let user = sync
                .actor
                .clone()
                .context("query needs --user or sync.actor")?;
            let condition: Value =
                serde_json::from_str(&condition).context("condition must be JSON")?;
            let mut request = QueryRequest::new(user, condition);
            request.limit = limit;
            request.skip = skip;
            request.sort = sort_desc.map(SortSpec::descending);
            Value::Array(db.query(&request).await?)
        }
    })
}
