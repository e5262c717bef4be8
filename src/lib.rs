//! # NoloDB
//!
//! A local-first record store with multi-server replication:
//! - Write-Ahead Logging (WAL) for durability
//! - Memtable / frozen-snapshot buffering with layered, compacted files
//! - Crash recovery with partial write handling
//! - Best-effort replication to redundant servers, timestamp reconciliation
//! - Declarative record queries
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Client actions (sync::Database)                 │
//! │   read / read_and_wait / write / patch / remove / query      │
//! └──────────┬───────────────────────────────────┬──────────────┘
//!            │ local first                       │ fan-out (Replicator)
//!            ▼                                   ▼
//!   ┌─────────────────┐                ┌──────────────────────┐
//!   │   LocalStore    │                │  HTTP server (axum)  │ × N
//!   │ Memory / Engine │                │   network::router    │
//!   └─────────────────┘                └──────────┬───────────┘
//!                                                 │
//!                        ┌────────────────────────┴──────────┐
//!                        ▼                                   ▼
//!                 ┌─────────────┐                    ┌─────────────┐
//!                 │     WAL     │                    │  MemTable   │
//!                 │  (Append)   │                    │ + snapshots │
//!                 └─────────────┘                    └──────┬──────┘
//!                                                           ▼
//!                                                   ┌─────────────┐
//!                                                   │   Storage   │
//!                                                   │  (layers)   │
//!                                                   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod record;
pub mod merge;
pub mod query;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;

pub mod local;
pub mod protocol;
pub mod network;
pub mod sync;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{NoloError, Result};
pub use config::{Config, SyncConfig};
pub use engine::Engine;
pub use key::{DbKey, KeyFlags};
pub use local::{LocalStore, MemoryStore};
pub use merge::deep_merge;
pub use query::{check_query, QueryRequest};
pub use sync::{Database, Replicator, ReplicationEvent};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of NoloDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
