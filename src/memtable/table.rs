//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::MemTableEntry;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<String, MemTableEntry>>,
    /// Approximate payload size in bytes
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the entry for a key (read lock)
    pub fn get(&self, key: &str) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair, returning the new entry count
    pub fn put(&self, key: String, value: String) -> usize {
        self.insert(key, MemTableEntry::Value(value))
    }

    /// Insert a tombstone, returning the new entry count
    pub fn delete(&self, key: String) -> usize {
        self.insert(key, MemTableEntry::Tombstone)
    }

    fn insert(&self, key: String, entry: MemTableEntry) -> usize {
        let added = key.len() + entry.as_stored().len();
        let mut data = self.data.write();
        let removed = data
            .get(&key)
            .map(|old| key.len() + old.as_stored().len())
            .unwrap_or(0);
        data.insert(key, entry);
        self.size.fetch_add(added, Ordering::Relaxed);
        self.size.fetch_sub(removed, Ordering::Relaxed);
        data.len()
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Snapshot of all entries in sorted key order (for flush)
    pub fn iter(&self) -> std::vec::IntoIter<(String, MemTableEntry)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Entries with `gte <= key <= lte`, in key order
    pub fn range(&self, gte: &str, lte: &str) -> Vec<(String, MemTableEntry)> {
        if gte > lte {
            return Vec::new();
        }
        self.data
            .read()
            .range::<str, _>((Bound::Included(gte), Bound::Included(lte)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Entries whose key starts with `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &str) -> Vec<(String, MemTableEntry)> {
        self.data
            .read()
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
