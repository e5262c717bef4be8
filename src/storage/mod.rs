//! Storage Module
//!
//! Persistent per-user storage built from line-oriented `.nolo` files.
//!
//! ## Responsibilities
//! - Persist flushed memtables as sorted layer-0 files
//! - Merge same-layer files into the next layer (compaction)
//! - Append hash records to the user's append-only hash log
//! - Point lookups and streaming scans in read-precedence order
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/{userId}/
//!   ├── index.nolo                 imported base log, general records (last line wins)
//!   ├── hash.nolo                  append-only log, hash records (last line wins)
//!   └── data_{ts}_layer{N}.nolo    immutable sorted layer files
//! ```
//!
//! ## Line Format
//! ```text
//! {key} {serializedValue}\n        value "0" is a tombstone
//! ```
//!
//! ## Read Precedence (newest data first)
//! layer 0 (newest timestamp first) → layer 1 → ... → index.nolo
//!
//! `index.nolo` is an import tier: the engine reads it but never writes it.
//! A user directory seeded from an existing dump keeps that dump there, and
//! new writes shadow it through the layer files. While it exists, top-layer
//! merges keep tombstones so deleted keys stay hidden.

mod base_log;
mod layer;
mod manager;

pub use base_log::BaseLog;
pub use layer::{LayerFile, LayerWriter};
pub use manager::StorageManager;

use crate::error::{NoloError, Result};

pub const INDEX_LOG: &str = "index.nolo";
pub const HASH_LOG: &str = "hash.nolo";

/// Split a stored line into (key, value)
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.split_once(' ')
}

/// Render one stored line, rejecting content that would break the format
pub fn format_line(key: &str, value: &str) -> Result<String> {
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(NoloError::MalformedInput(format!(
            "key must be non-empty without whitespace: {:?}",
            key
        )));
    }
    if value.contains('\n') || value.contains('\r') {
        return Err(NoloError::MalformedInput(format!(
            "value for {} contains a line break",
            key
        )));
    }
    Ok(format!("{} {}\n", key, value))
}
