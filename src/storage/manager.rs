//! Storage Manager
//!
//! Manages every user's files and coordinates flushes, reads and compaction.
//!
//! ## Responsibilities
//! - Route flushed entries to hash logs or new layer-0 files
//! - Search a user's files in read-precedence order
//! - Merge same-layer files once enough accumulate
//! - Stream a user's resolved contents for queries and range scans

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::Result;
use crate::key::DbKey;
use crate::memtable::{MemTable, MemTableEntry};

use super::{BaseLog, LayerFile, LayerWriter, HASH_LOG, INDEX_LOG};

/// Manages the storage layer
///
/// ## Concurrency:
/// - `file_set`: readers hold it shared while walking files; compaction
///   takes it exclusively only to delete merged inputs
/// - `last_file_ts`: atomic, keeps layer file timestamps unique and
///   increasing across restarts
/// - Flush and compaction are driven by a single caller (the engine's
///   flush lock), so they never race each other
pub struct StorageManager {
    /// Root directory holding one sub-directory per user
    data_dir: PathBuf,

    /// Same-layer file count that triggers a merge
    merge_threshold: usize,

    file_set: RwLock<()>,

    last_file_ts: AtomicU64,
}

/// Outcome of one merge step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub user_id: String,
    pub from_layer: u32,
    pub inputs: usize,
    pub entries_written: usize,
    pub tombstones_dropped: usize,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// New layer files are stamped after the newest existing one, so a clock
    /// that went backwards across a restart cannot rank fresh data behind
    /// older files.
    pub fn open(path: &Path, merge_threshold: usize) -> Result<Self> {
        fs::create_dir_all(path)?;
        let manager = Self {
            data_dir: path.to_path_buf(),
            merge_threshold: merge_threshold.max(2),
            file_set: RwLock::new(()),
            last_file_ts: AtomicU64::new(0),
        };

        let mut newest = 0;
        for user in manager.users()? {
            for file in manager.layer_files(&user)? {
                newest = newest.max(file.timestamp);
            }
        }
        manager.last_file_ts.store(newest, Ordering::SeqCst);
        Ok(manager)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn user_dir(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(user_id)
    }

    pub fn index_log(&self, user_id: &str) -> BaseLog {
        BaseLog::new(self.user_dir(user_id).join(INDEX_LOG))
    }

    pub fn hash_log(&self, user_id: &str) -> BaseLog {
        BaseLog::new(self.user_dir(user_id).join(HASH_LOG))
    }

    /// Users that have a directory on disk
    pub fn users(&self) -> Result<Vec<String>> {
        let mut users = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    users.push(name.to_string());
                }
            }
        }
        users.sort();
        Ok(users)
    }

    /// Layer files of a user in read-precedence order
    pub fn layer_files(&self, user_id: &str) -> Result<Vec<LayerFile>> {
        LayerFile::list(&self.user_dir(user_id))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look a key up in the user's files.
    ///
    /// Returns:
    /// - `Ok(Some(Value))` — latest stored value
    /// - `Ok(Some(Tombstone))` — latest entry is a deletion
    /// - `Ok(None)` — never written to disk
    pub fn get(&self, key: &DbKey) -> Result<Option<MemTableEntry>> {
        let _files = self.file_set.read();
        let encoded = key.to_string();

        if key.flags.is_hash {
            return self.hash_log(&key.user_id).get(&encoded);
        }

        for file in self.layer_files(&key.user_id)? {
            if let Some(entry) = file.get(&encoded)? {
                return Ok(Some(entry));
            }
        }
        self.index_log(&key.user_id).get(&encoded)
    }

    /// Stream the user's on-disk entries in precedence order, each key at
    /// most once (its newest version). Keys in `shadowed` are skipped, which
    /// lets the caller put newer in-memory state in front.
    pub fn visit_user(
        &self,
        user_id: &str,
        shadowed: &HashSet<String>,
        mut visit: impl FnMut(&str, MemTableEntry) -> Result<()>,
    ) -> Result<()> {
        let _files = self.file_set.read();
        let mut seen: HashSet<String> = HashSet::new();

        for file in self.layer_files(user_id)? {
            file.for_each(|key, entry| {
                if shadowed.contains(key) || !seen.insert(key.to_string()) {
                    return Ok(());
                }
                visit(key, entry)
            })?;
        }

        for log in [self.index_log(user_id), self.hash_log(user_id)] {
            let mut latest: Vec<(String, MemTableEntry)> = log.load()?.into_iter().collect();
            latest.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, entry) in latest {
                if shadowed.contains(&key) || !seen.insert(key.clone()) {
                    continue;
                }
                visit(&key, entry)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Persist a frozen memtable.
    ///
    /// Entries are grouped per user: hash keys are appended to `hash.nolo`,
    /// the rest become one sorted layer-0 file. Every file is fsynced before
    /// this returns, after which the caller may drop the WAL segment.
    pub fn flush(&self, memtable: &MemTable) -> Result<Vec<String>> {
        let mut per_user: BTreeMap<String, (Vec<(String, MemTableEntry)>, Vec<(String, MemTableEntry)>)> =
            BTreeMap::new();

        for (key, entry) in memtable.iter() {
            let parsed = DbKey::parse(&key)?;
            let slot = per_user.entry(parsed.user_id).or_default();
            if parsed.flags.is_hash {
                slot.0.push((key, entry));
            } else {
                slot.1.push((key, entry));
            }
        }

        for (user_id, (hashed, layered)) in &per_user {
            fs::create_dir_all(self.user_dir(user_id))?;

            if !hashed.is_empty() {
                self.hash_log(user_id)
                    .append(hashed.iter().map(|(k, e)| (k.as_str(), e)))?;
            }

            if !layered.is_empty() {
                let target = self.next_layer_file(user_id, 0);
                let mut writer = LayerWriter::create(target)?;
                for (key, entry) in layered {
                    writer.add(key, entry)?;
                }
                let file = writer.finish()?;
                tracing::debug!(
                    user = %user_id,
                    file = %file.path.display(),
                    entries = layered.len(),
                    hashed = hashed.len(),
                    "flushed memtable to layer 0"
                );
            }
        }

        Ok(per_user.into_keys().collect())
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Merge layers of `user_id` until no layer holds `merge_threshold` files
    pub fn merge_layer_files_if_needed(&self, user_id: &str) -> Result<Vec<MergeReport>> {
        let mut reports = Vec::new();
        loop {
            let files = self.layer_files(user_id)?;
            let mut by_layer: BTreeMap<u32, Vec<LayerFile>> = BTreeMap::new();
            for file in files {
                by_layer.entry(file.layer).or_default().push(file);
            }
            let max_layer = by_layer.keys().next_back().copied().unwrap_or(0);

            let Some((&layer, inputs)) = by_layer
                .iter()
                .find(|(_, files)| files.len() >= self.merge_threshold)
            else {
                return Ok(reports);
            };

            let report = self.merge(user_id, layer, inputs, layer == max_layer)?;
            tracing::info!(
                user = %user_id,
                from_layer = report.from_layer,
                inputs = report.inputs,
                entries = report.entries_written,
                tombstones_dropped = report.tombstones_dropped,
                "merged layer files"
            );
            reports.push(report);
        }
    }

    /// Merge `inputs` (all files of `layer`, newest first) into one file at
    /// `layer + 1`. Tombstones are dropped only when nothing older can still
    /// hold the key: the merge is at the top layer and there is no base log.
    fn merge(&self, user_id: &str, layer: u32, inputs: &[LayerFile], at_top: bool) -> Result<MergeReport> {
        let drop_tombstones = at_top && !self.index_log(user_id).exists();

        // Oldest first, so later files overwrite earlier ones on collision.
        let mut merged: BTreeMap<String, MemTableEntry> = BTreeMap::new();
        for file in inputs.iter().rev() {
            file.for_each(|key, entry| {
                merged.insert(key.to_string(), entry);
                Ok(())
            })?;
        }

        let mut writer = LayerWriter::create(self.next_layer_file(user_id, layer + 1))?;
        let mut tombstones_dropped = 0;
        for (key, entry) in &merged {
            if drop_tombstones && entry.is_tombstone() {
                tombstones_dropped += 1;
                continue;
            }
            writer.add(key, entry)?;
        }
        let entries_written = writer.entry_count();
        writer.finish()?;

        {
            let _files = self.file_set.write();
            for file in inputs {
                fs::remove_file(&file.path)?;
            }
        }

        Ok(MergeReport {
            user_id: user_id.to_string(),
            from_layer: layer,
            inputs: inputs.len(),
            entries_written,
            tombstones_dropped,
        })
    }

    /// Count files per layer (for inspection and tests)
    pub fn layer_counts(&self, user_id: &str) -> Result<HashMap<u32, usize>> {
        let mut counts = HashMap::new();
        for file in self.layer_files(user_id)? {
            *counts.entry(file.layer).or_insert(0) += 1;
        }
        Ok(counts)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// A fresh layer file path with a timestamp unique in this process
    fn next_layer_file(&self, user_id: &str, layer: u32) -> LayerFile {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let dir = self.user_dir(user_id);
        let mut ts = self.bump_file_ts(now);
        loop {
            let candidate = LayerFile::new(&dir, ts, layer);
            if !candidate.path.exists() {
                return candidate;
            }
            ts = self.bump_file_ts(ts + 1);
        }
    }

    fn bump_file_ts(&self, at_least: u64) -> u64 {
        let mut last = self.last_file_ts.load(Ordering::SeqCst);
        loop {
            let next = at_least.max(last + 1);
            match self
                .last_file_ts
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("data_dir", &self.data_dir)
            .field("merge_threshold", &self.merge_threshold)
            .finish()
    }
}
