//! Append-only base logs (`index.nolo`, `hash.nolo`)
//!
//! Unsorted `key value` lines where the last line for a key wins.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::memtable::MemTableEntry;

use super::{format_line, parse_line};

pub struct BaseLog {
    path: PathBuf,
}

impl BaseLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Append entries and fsync before returning
    pub fn append<'a>(&self, entries: impl IntoIterator<Item = (&'a str, &'a MemTableEntry)>) -> Result<usize> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let mut count = 0;
        for (key, entry) in entries {
            writer.write_all(format_line(key, entry.as_stored())?.as_bytes())?;
            count += 1;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(count)
    }

    /// Last entry written for `key`, if any
    pub fn get(&self, key: &str) -> Result<Option<MemTableEntry>> {
        if !self.exists() {
            return Ok(None);
        }
        let mut found = None;
        for line in BufReader::new(File::open(&self.path)?).lines() {
            let line = line?;
            if let Some((k, v)) = parse_line(&line) {
                if k == key {
                    found = Some(MemTableEntry::from_stored(v));
                }
            }
        }
        Ok(found)
    }

    /// Resolve the whole log to its latest entry per key
    pub fn load(&self) -> Result<HashMap<String, MemTableEntry>> {
        let mut latest = HashMap::new();
        if !self.exists() {
            return Ok(latest);
        }
        for line in BufReader::new(File::open(&self.path)?).lines() {
            let line = line?;
            if let Some((k, v)) = parse_line(&line) {
                latest.insert(k.to_string(), MemTableEntry::from_stored(v));
            }
        }
        Ok(latest)
    }
}
