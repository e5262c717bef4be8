//! Layer files
//!
//! Immutable, sorted `key value` files tagged with a creation timestamp and
//! a layer number. Written once through [`LayerWriter`] (temp file, fsync,
//! rename) and never modified afterwards.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{NoloError, Result};
use crate::memtable::MemTableEntry;

use super::{format_line, parse_line};

/// A layer file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerFile {
    pub path: PathBuf,
    pub timestamp: u64,
    pub layer: u32,
}

impl LayerFile {
    pub fn new(dir: &Path, timestamp: u64, layer: u32) -> Self {
        Self {
            path: dir.join(format!("data_{}_layer{}.nolo", timestamp, layer)),
            timestamp,
            layer,
        }
    }

    /// Parse "data_1700000000000_layer2.nolo" → (1700000000000, 2)
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_prefix("data_")?.strip_suffix(".nolo")?;
        let (ts, layer) = stem.split_once("_layer")?;
        Some(Self {
            path: path.to_path_buf(),
            timestamp: ts.parse().ok()?,
            layer: layer.parse().ok()?,
        })
    }

    /// Layer files in `dir`, in read precedence order:
    /// lowest layer first, newest timestamp first within a layer
    pub fn list(dir: &Path) -> Result<Vec<Self>> {
        let mut files = Vec::new();
        if !dir.exists() {
            return Ok(files);
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(file) = Self::parse(&path) {
                    files.push(file);
                }
            }
        }
        files.sort_by(|a, b| a.layer.cmp(&b.layer).then(b.timestamp.cmp(&a.timestamp)));
        Ok(files)
    }

    /// Point lookup. Lines are sorted, so the scan stops past `key`.
    pub fn get(&self, key: &str) -> Result<Option<MemTableEntry>> {
        for line in BufReader::new(File::open(&self.path)?).lines() {
            let line = line?;
            let Some((k, v)) = parse_line(&line) else {
                continue;
            };
            match k.cmp(key) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => return Ok(Some(MemTableEntry::from_stored(v))),
                std::cmp::Ordering::Greater => break,
            }
        }
        Ok(None)
    }

    /// Stream every `(key, entry)` line to `visit`
    pub fn for_each(&self, mut visit: impl FnMut(&str, MemTableEntry) -> Result<()>) -> Result<()> {
        for line in BufReader::new(File::open(&self.path)?).lines() {
            let line = line?;
            if let Some((k, v)) = parse_line(&line) {
                visit(k, MemTableEntry::from_stored(v))?;
            }
        }
        Ok(())
    }
}

/// Writes a new layer file from entries supplied in ascending key order
pub struct LayerWriter {
    target: LayerFile,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    entry_count: usize,
    last_key: Option<String>,
}

impl LayerWriter {
    pub fn create(target: LayerFile) -> Result<Self> {
        let mut tmp_path = target.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            target,
            tmp_path,
            writer: BufWriter::new(file),
            entry_count: 0,
            last_key: None,
        })
    }

    /// Add an entry (must be called in strictly ascending key order)
    pub fn add(&mut self, key: &str, entry: &MemTableEntry) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last.as_str() {
                return Err(NoloError::Storage(format!(
                    "layer entries out of order: {} after {}",
                    key, last
                )));
            }
        }
        self.writer.write_all(format_line(key, entry.as_stored())?.as_bytes())?;
        self.last_key = Some(key.to_string());
        self.entry_count += 1;
        Ok(())
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Fsync and atomically publish the file under its final name
    pub fn finish(mut self) -> Result<LayerFile> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        fs::rename(&self.tmp_path, &self.target.path)?;
        if let Some(dir) = self.target.path.parent() {
            // Persist the rename itself.
            File::open(dir).and_then(|d| d.sync_all()).ok();
        }
        Ok(self.target)
    }
}
