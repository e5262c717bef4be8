//! Frozen memtables
//!
//! A memtable that has been swapped out of the write path. It stays readable
//! until its contents are durable in layer files, then its WAL segment is
//! removed.

use std::sync::Arc;

use crate::wal::WalSegment;

use super::{MemTable, MemTableEntry};

pub struct FrozenMemTable {
    memtable: Arc<MemTable>,
    wal: WalSegment,
}

impl FrozenMemTable {
    pub fn new(memtable: Arc<MemTable>, wal: WalSegment) -> Self {
        Self { memtable, wal }
    }

    pub fn get(&self, key: &str) -> Option<MemTableEntry> {
        self.memtable.get(key)
    }

    pub fn memtable(&self) -> &Arc<MemTable> {
        &self.memtable
    }

    pub fn wal(&self) -> &WalSegment {
        &self.wal
    }
}
