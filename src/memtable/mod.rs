//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track entry count for flush triggers
//! - Ordered iteration for layer file creation
//! - Frozen snapshots awaiting flush, each tied to its WAL segment
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (required for sorted layer files and range scans)
//! - Tombstones are kept as entries so deletes shadow older layers

mod table;
mod frozen;

pub use table::MemTable;
pub use frozen::FrozenMemTable;

/// On-disk tombstone sentinel
pub const TOMBSTONE: &str = "0";

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live serialized value
    Value(String),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// Decode an on-disk value column
    pub fn from_stored(value: &str) -> Self {
        if value == TOMBSTONE {
            MemTableEntry::Tombstone
        } else {
            MemTableEntry::Value(value.to_string())
        }
    }

    /// Encode for the on-disk value column
    pub fn as_stored(&self) -> &str {
        match self {
            MemTableEntry::Value(v) => v,
            MemTableEntry::Tombstone => TOMBSTONE,
        }
    }

    pub fn into_value(self) -> Option<String> {
        match self {
            MemTableEntry::Value(v) => Some(v),
            MemTableEntry::Tombstone => None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, MemTableEntry::Tombstone)
    }
}
