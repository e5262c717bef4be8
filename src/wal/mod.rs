//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append log entries before any memtable mutation
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Crash recovery and replay
//! - One segment file per memtable generation
//!
//! ## Segment Naming
//! `wal_{timestamp}_{seq}.log`, replayed in `(timestamp, seq)` order.
//! A segment is deleted only after the memtable it backs has been
//! written to layer files.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```

mod entry;
mod writer;
mod reader;
mod recovery;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use entry::{WalEntry, Operation, HEADER_SIZE};
pub use writer::WalWriter;
pub use reader::{WalReader, WalIterator};
pub use recovery::{WalRecovery, RecoveryResult};

/// A WAL segment file on disk
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WalSegment {
    pub timestamp: u64,
    pub seq: u64,
    pub path: PathBuf,
}

impl WalSegment {
    pub fn new(dir: &Path, timestamp: u64, seq: u64) -> Self {
        Self {
            timestamp,
            seq,
            path: dir.join(format!("wal_{}_{}.log", timestamp, seq)),
        }
    }

    /// Parse "wal_1700000000000_3.log" → (1700000000000, 3)
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_prefix("wal_")?.strip_suffix(".log")?;
        let (ts, seq) = stem.split_once('_')?;
        Some(Self {
            timestamp: ts.parse().ok()?,
            seq: seq.parse().ok()?,
            path: path.to_path_buf(),
        })
    }

    /// All segments in `dir`, oldest first
    pub fn list(dir: &Path) -> Result<Vec<Self>> {
        let mut segments = Vec::new();
        if !dir.exists() {
            return Ok(segments);
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(segment) = Self::parse(&path) {
                    segments.push(segment);
                }
            }
        }
        segments.sort();
        Ok(segments)
    }
}
