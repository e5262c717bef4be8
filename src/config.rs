//! Configuration for NoloDB
//!
//! Centralized configuration with sensible defaults. Server-side engine
//! settings live in [`Config`], client-side replication settings in
//! [`SyncConfig`]. Both can be loaded from one TOML file via [`FileConfig`].

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{NoloError, Result};

/// Main configuration for a NoloDB server instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal_{ts}_{seq}.log             (write-ahead log segments)
    ///     └── {userId}/
    ///           ├── index.nolo               (base log, general records)
    ///           ├── hash.nolo                (append-only log, hash records)
    ///           └── data_{ts}_layer{N}.nolo  (layer files)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable / Layer Configuration
    // -------------------------------------------------------------------------
    /// Max number of entries in the live memtable before it is frozen
    pub memtable_entry_limit: usize,

    /// Number of files sharing a layer that triggers a merge into layer+1
    pub layer_merge_threshold: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// HTTP listen address
    pub listen_addr: String,

    /// Path prefix of the record API
    pub api_prefix: String,

    /// Rules letting an actor mutate another user's namespace
    pub allow_list: Vec<AllowRule>,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Grants `actor` write access to the `namespace` user directory.
/// `"*"` matches any actor or any namespace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AllowRule {
    pub actor: String,
    pub namespace: String,
}

impl AllowRule {
    pub fn permits(&self, actor: &str, namespace: &str) -> bool {
        (self.actor == "*" || self.actor == actor)
            && (self.namespace == "*" || self.namespace == namespace)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./nolodata"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_entry_limit: 3,
            layer_merge_threshold: 3,
            listen_addr: "127.0.0.1:8080".to_string(),
            api_prefix: "/api/v1/db".to_string(),
            allow_list: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memtable_entry_limit == 0 {
            return Err(NoloError::Config(
                "memtable_entry_limit must be at least 1".to_string(),
            ));
        }
        if self.layer_merge_threshold < 2 {
            return Err(NoloError::Config(
                "layer_merge_threshold must be at least 2".to_string(),
            ));
        }
        if !self.api_prefix.is_empty() && !self.api_prefix.starts_with('/') {
            return Err(NoloError::Config(format!(
                "api_prefix must start with '/': {}",
                self.api_prefix
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable entry limit
    pub fn memtable_entry_limit(mut self, entries: usize) -> Self {
        self.config.memtable_entry_limit = entries;
        self
    }

    /// Set how many same-layer files trigger a merge
    pub fn layer_merge_threshold(mut self, files: usize) -> Self {
        self.config.layer_merge_threshold = files;
        self
    }

    /// Set the HTTP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the API path prefix
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.api_prefix = prefix.into();
        self
    }

    /// Add an allow-list rule
    pub fn allow(mut self, actor: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.config.allow_list.push(AllowRule {
            actor: actor.into(),
            namespace: namespace.into(),
        });
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Client-side replication settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Server currently selected by the user, if any
    pub current_server: Option<String>,

    /// Fixed redundant servers every mutation is mirrored to
    pub mirrors: Vec<String>,

    /// Path prefix of the record API on every server
    pub api_prefix: String,

    /// Per-request timeout (milliseconds)
    pub request_timeout_ms: u64,

    /// Upper bound on in-flight background replication requests
    pub max_concurrent_replications: usize,

    /// Acting user id sent with every request
    pub actor: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            current_server: None,
            mirrors: Vec::new(),
            api_prefix: "/api/v1/db".to_string(),
            request_timeout_ms: 5000,
            max_concurrent_replications: 8,
            actor: None,
        }
    }
}

impl SyncConfig {
    /// Current server followed by the mirrors, deduplicated, order preserved
    pub fn server_list(&self) -> Vec<String> {
        let mut servers: Vec<String> = Vec::new();
        for server in self.current_server.iter().chain(self.mirrors.iter()) {
            let normalized = server.trim().trim_end_matches('/').to_string();
            if !normalized.is_empty() && !servers.contains(&normalized) {
                servers.push(normalized);
            }
        }
        servers
    }
}

/// On-disk configuration file: `[server]` and `[sync]` tables
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: Config,
    pub sync: SyncConfig,
}

impl FileConfig {
    /// Load from a TOML file (defaults if it does not exist), then apply env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)
                .map_err(|e| NoloError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            tracing::info!("no config file at {}, using defaults", path.display());
            FileConfig::default()
        };

        config.apply_env_overrides();
        config.server.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (NOLO_DATA_DIR, NOLO_LISTEN, NOLO_SERVERS)
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NOLO_DATA_DIR") {
            self.server.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("NOLO_LISTEN") {
            self.server.listen_addr = val;
        }
        if let Ok(val) = std::env::var("NOLO_SERVERS") {
            self.sync.mirrors = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
}
