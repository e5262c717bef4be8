//! Engine Module
//!
//! The server-side storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, frozen snapshots and Storage
//! - Handle concurrent read/write access
//! - Freeze the MemTable when it is full and flush it in the background
//! - Manage crash recovery on startup
//! - Answer point reads, range scans and record queries over the merged view

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::config::Config;
use crate::error::{NoloError, Result};
use crate::key::{DbKey, KeyFlags};
use crate::memtable::{FrozenMemTable, MemTable, MemTableEntry, TOMBSTONE};
use crate::query::QueryRequest;
use crate::storage::{format_line, LayerFile, StorageManager};
use crate::wal::{Operation, WalRecovery, WalSegment, WalWriter};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (set/delete/rotate): Serialized by `write_lock`
///   - Must acquire: write_lock → WAL → memtable
///
/// - **Reads** (get/scan/query): No write_lock needed
///   - Live memtable, then frozen snapshots newest first, then files
///   - A snapshot is published to `frozen` before the live table is
///     swapped, so a reader never falls into a gap
///
/// - **Flush**: one background thread fed by a channel, plus synchronous
///   `flush()`; both serialize on `flush_lock`
pub struct Engine {
    inner: Arc<EngineInner>,
    flusher: Option<Flusher>,
}

struct EngineInner {
    /// Engine configuration
    config: Config,

    /// Persistent per-user files
    storage: StorageManager,

    /// Live memtable receiving writes
    active: RwLock<Arc<MemTable>>,

    /// WAL segment backing the live memtable
    wal: Mutex<ActiveWal>,

    /// Frozen memtables awaiting flush, newest at the front
    frozen: RwLock<VecDeque<Arc<FrozenMemTable>>>,

    /// Serializes write operations
    write_lock: Mutex<()>,

    /// Serializes flush and compaction
    flush_lock: Mutex<()>,

    /// Next WAL segment sequence number
    next_wal_seq: AtomicU64,
}

struct ActiveWal {
    writer: WalWriter,
    segment: WalSegment,
}

struct Flusher {
    signal: Sender<()>,
    handle: JoinHandle<()>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Replay every WAL segment in (timestamp, seq) order
    /// 3. Older segments become frozen snapshots, the newest becomes the
    ///    live memtable (exactly the pre-crash state)
    /// 4. Start the flusher and hand it any recovered snapshots
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let storage = StorageManager::open(&config.data_dir, config.layer_merge_threshold)?;

        let mut segments = WalSegment::list(&config.data_dir)?;
        let next_seq = segments.iter().map(|s| s.seq + 1).max().unwrap_or(1);

        let mut frozen = VecDeque::new();
        let mut recovered_entries = 0u64;
        let live_segment = segments.pop();

        for segment in segments {
            let memtable = Self::replay(&segment, &mut recovered_entries)?;
            if memtable.is_empty() {
                fs::remove_file(&segment.path)?;
                continue;
            }
            frozen.push_front(Arc::new(FrozenMemTable::new(Arc::new(memtable), segment)));
        }

        let (active, wal) = match live_segment {
            Some(segment) => {
                let memtable = Self::replay(&segment, &mut recovered_entries)?;
                let writer = WalWriter::open(&segment.path, config.wal_sync_strategy)?;
                (memtable, ActiveWal { writer, segment })
            }
            None => {
                let segment = WalSegment::new(&config.data_dir, now_millis(), next_seq - 1);
                let writer = WalWriter::open(&segment.path, config.wal_sync_strategy)?;
                (MemTable::new(), ActiveWal { writer, segment })
            }
        };

        if recovered_entries > 0 {
            tracing::info!(
                entries = recovered_entries,
                frozen = frozen.len(),
                live = active.entry_count(),
                "recovered memtables from WAL"
            );
        }

        let pending_flush = !frozen.is_empty();
        let inner = Arc::new(EngineInner {
            config,
            storage,
            active: RwLock::new(Arc::new(active)),
            wal: Mutex::new(wal),
            frozen: RwLock::new(frozen),
            write_lock: Mutex::new(()),
            flush_lock: Mutex::new(()),
            next_wal_seq: AtomicU64::new(next_seq.max(1)),
        });

        let flusher = Flusher::spawn(Arc::clone(&inner))?;
        if pending_flush {
            flusher.signal.send(()).ok();
        }

        Ok(Self {
            inner,
            flusher: Some(flusher),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    fn replay(segment: &WalSegment, counter: &mut u64) -> Result<MemTable> {
        let (entries, result) = WalRecovery::recover(&segment.path)?;
        if result.entries_corrupted > 0 || result.was_truncated {
            tracing::warn!(
                segment = %segment.path.display(),
                recovered = result.entries_recovered,
                corrupted = result.entries_corrupted,
                truncated = result.was_truncated,
                "WAL segment needed repair"
            );
        }

        let memtable = MemTable::new();
        for entry in entries {
            match entry.operation {
                Operation::Set { key, value } => memtable.put(key, value),
                Operation::Delete { key } => memtable.delete(key),
            };
            *counter += 1;
        }
        Ok(memtable)
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    /// Get the latest live value of a key
    ///
    /// Search order:
    /// 1. Live MemTable
    /// 2. Frozen snapshots (newest to oldest)
    /// 3. On-disk files
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let parsed = DbKey::parse(key)?;
        Ok(self.inner.lookup(key, &parsed)?.and_then(MemTableEntry::into_value))
    }

    /// Write a serialized value
    ///
    /// Steps:
    /// 1. Validate key and value against the line format
    /// 2. Acquire write lock, freezing the memtable first if it is full
    /// 3. Append to WAL (durability)
    /// 4. Insert into MemTable
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        DbKey::parse(key)?;
        if value == TOMBSTONE {
            return Err(NoloError::MalformedInput(format!(
                "value {:?} is reserved for deletions",
                TOMBSTONE
            )));
        }
        format_line(key, value)?;

        let rotated = self.inner.apply(Operation::Set {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        self.after_write(rotated);
        Ok(())
    }

    /// Delete a key by writing a tombstone
    ///
    /// The tombstone is visible to readers as soon as this returns; the
    /// physical removal happens when compaction reaches the top layer.
    pub fn delete(&self, key: &str) -> Result<()> {
        DbKey::parse(key)?;
        let rotated = self.inner.apply(Operation::Delete {
            key: key.to_string(),
        })?;
        self.after_write(rotated);
        Ok(())
    }

    fn after_write(&self, rotated: bool) {
        if rotated {
            if let Some(flusher) = &self.flusher {
                flusher.signal.send(()).ok();
            }
        }
    }

    /// Read and decode a JSON record
    pub fn get_record(&self, key: &str) -> Result<Option<Value>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Encode and write a JSON record
    pub fn set_record(&self, key: &str, record: &Value) -> Result<()> {
        self.set(key, &serde_json::to_string(record)?)
    }

    // =========================================================================
    // Scans
    // =========================================================================

    /// Live entries with `gte <= key <= lte`, in key order
    pub fn scan(&self, gte: &str, lte: &str) -> Result<Vec<(String, String)>> {
        if gte > lte {
            return Ok(Vec::new());
        }
        let in_range = |k: &str| k >= gte && k <= lte;

        let memory = self.inner.memory_view(|table| table.range(gte, lte));
        let shadowed: HashSet<String> = memory.keys().cloned().collect();
        let mut merged: BTreeMap<String, MemTableEntry> = memory;

        // Bounds sharing a `{flags}-{userId}-` prefix confine the range to
        // that user's files.
        let users = match (key_space(gte), key_space(lte)) {
            (Some(a), Some(b)) if a == b => vec![a.1.to_string()],
            _ => self.inner.storage.users()?,
        };
        for user in users {
            self.inner.storage.visit_user(&user, &shadowed, |key, entry| {
                if in_range(key) {
                    merged.insert(key.to_string(), entry);
                }
                Ok(())
            })?;
        }

        Ok(merged
            .into_iter()
            .filter_map(|(k, e)| e.into_value().map(|v| (k, v)))
            .collect())
    }

    /// Every live JSON record of one user, newest version per key
    pub fn user_records(&self, user_id: &str) -> Result<Vec<(String, Value)>> {
        let mut out = Vec::new();
        self.visit_records(user_id, |key, record| {
            out.push((key.to_string(), record));
            Ok(())
        })?;
        Ok(out)
    }

    /// Filter one user's records
    ///
    /// Streams memory first, then each file in precedence order; a key is
    /// judged only on its newest version, so deleted or overwritten records
    /// never leak from older files.
    pub fn query(&self, request: &QueryRequest) -> Result<Vec<Value>> {
        let mut hits = Vec::new();
        self.visit_records(&request.user_id, |key, record| {
            if request.accepts_key(key) && request.accepts_record(&record)? {
                hits.push(record);
            }
            Ok(())
        })?;
        Ok(request.apply_window(hits))
    }

    /// Tombstone a dialog record together with every record of the same
    /// user whose `dialogId` names it. Returns the deleted keys.
    pub fn delete_messages(&self, dialog_key: &str) -> Result<Vec<String>> {
        let dialog = DbKey::parse(dialog_key)?;
        let mut targets = vec![dialog_key.to_string()];

        self.visit_records(&dialog.user_id, |key, record| {
            let belongs = record
                .get("dialogId")
                .and_then(Value::as_str)
                .is_some_and(|id| id == dialog.id || id == dialog_key);
            let key = key.to_string();
            if belongs && key != dialog_key {
                targets.push(key);
            }
            Ok(())
        })?;

        for key in &targets {
            self.delete(key)?;
        }
        Ok(targets)
    }

    /// Visit each live JSON record of a user once, newest version only
    fn visit_records(
        &self,
        user_id: &str,
        mut visit: impl FnMut(&DbKey, Value) -> Result<()>,
    ) -> Result<()> {
        let memory = self.inner.memory_view(|table| {
            KeyFlags::all()
                .flat_map(|flags| table.scan_prefix(&DbKey::user_prefix(flags, user_id)))
                .collect()
        });
        let shadowed: HashSet<String> = memory.keys().cloned().collect();

        let mut consider = |key: &str, entry: MemTableEntry| -> Result<()> {
            let Some(raw) = entry.into_value() else {
                return Ok(());
            };
            let Ok(parsed) = DbKey::parse(key) else {
                tracing::debug!(key, "skipping unparseable key");
                return Ok(());
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(record) => visit(&parsed, record),
                Err(_) => Ok(()),
            }
        };

        for (key, entry) in memory {
            consider(&key, entry)?;
        }
        self.inner.storage.visit_user(user_id, &shadowed, consider)
    }

    // =========================================================================
    // Flush / Lifecycle
    // =========================================================================

    /// Flush memtable to disk
    ///
    /// Freezes the live memtable (if non-empty) and synchronously writes
    /// every pending snapshot to layer files.
    pub fn flush(&self) -> Result<()> {
        {
            let _write_guard = self.inner.write_lock.lock();
            if !self.inner.active.read().is_empty() {
                self.inner.rotate()?;
            }
        }
        self.inner.flush_frozen()
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and stops the flusher
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.stop_flusher();
        Ok(())
    }

    fn stop_flusher(&mut self) {
        if let Some(Flusher { signal, handle }) = self.flusher.take() {
            drop(signal);
            if handle.join().is_err() {
                tracing::error!("flusher thread panicked");
            }
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.inner.config.data_dir
    }

    /// Get the live memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.inner.active.read().entry_count()
    }

    /// Number of frozen snapshots not yet flushed
    pub fn frozen_count(&self) -> usize {
        self.inner.frozen.read().len()
    }

    /// Layer files of a user in read-precedence order
    pub fn layer_files(&self, user_id: &str) -> Result<Vec<LayerFile>> {
        self.inner.storage.layer_files(user_id)
    }

    /// WAL segments currently on disk
    pub fn wal_segments(&self) -> Result<Vec<PathBuf>> {
        Ok(WalSegment::list(self.data_dir())?
            .into_iter()
            .map(|s| s.path)
            .collect())
    }

    pub fn storage(&self) -> &StorageManager {
        &self.inner.storage
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop_flusher();
    }
}

impl EngineInner {
    fn lookup(&self, key: &str, parsed: &DbKey) -> Result<Option<MemTableEntry>> {
        if let Some(entry) = self.active.read().get(key) {
            return Ok(Some(entry));
        }
        for snapshot in self.frozen.read().iter() {
            if let Some(entry) = snapshot.get(key) {
                return Ok(Some(entry));
            }
        }
        self.storage.get(parsed)
    }

    /// Log then apply one operation. Returns whether the memtable was frozen.
    fn apply(&self, operation: Operation) -> Result<bool> {
        let _write_guard = self.write_lock.lock();

        let rotated = self.active.read().entry_count() >= self.config.memtable_entry_limit;
        if rotated {
            self.rotate()?;
        }

        self.wal.lock().writer.append(operation.clone())?;

        let active = self.active.read();
        match operation {
            Operation::Set { key, value } => active.put(key, value),
            Operation::Delete { key } => active.delete(key),
        };
        Ok(rotated)
    }

    /// Freeze the live memtable behind a fresh WAL segment (write lock held)
    fn rotate(&self) -> Result<()> {
        let mut wal = self.wal.lock();
        let seq = self.next_wal_seq.fetch_add(1, Ordering::SeqCst);
        let timestamp = now_millis().max(wal.segment.timestamp);
        let segment = WalSegment::new(&self.config.data_dir, timestamp, seq);
        let writer = WalWriter::open(&segment.path, self.config.wal_sync_strategy)?;

        wal.writer.sync()?;
        let old_segment = std::mem::replace(&mut wal.segment, segment);
        wal.writer = writer;

        // Publish the snapshot before swapping so readers never miss it.
        let old_table = Arc::clone(&self.active.read());
        let frozen_bytes = old_table.size();
        self.frozen
            .write()
            .push_front(Arc::new(FrozenMemTable::new(old_table, old_segment)));
        *self.active.write() = Arc::new(MemTable::new());

        tracing::debug!(seq, bytes = frozen_bytes, "memtable frozen");
        Ok(())
    }

    /// Write frozen snapshots to disk, oldest first. A snapshot and its WAL
    /// segment are released only after its files are durable.
    fn flush_frozen(&self) -> Result<()> {
        let _flush_guard = self.flush_lock.lock();

        loop {
            let Some(oldest) = self.frozen.read().back().cloned() else {
                return Ok(());
            };

            let users = self.storage.flush(oldest.memtable())?;

            if let Err(e) = fs::remove_file(&oldest.wal().path) {
                tracing::warn!(segment = %oldest.wal().path.display(), error = %e, "could not remove flushed WAL segment");
            }
            {
                let mut frozen = self.frozen.write();
                if frozen.back().is_some_and(|s| Arc::ptr_eq(s, &oldest)) {
                    frozen.pop_back();
                }
            }

            for user in users {
                self.storage.merge_layer_files_if_needed(&user)?;
            }
        }
    }

    /// Entries `select` picks from each in-memory table, newest version per key
    fn memory_view(
        &self,
        select: impl Fn(&MemTable) -> Vec<(String, MemTableEntry)>,
    ) -> BTreeMap<String, MemTableEntry> {
        let mut view = BTreeMap::new();

        // Live table before the frozen list, the same order as `lookup`.
        // `rotate` publishes a snapshot before swapping it out, so a table
        // rotated in between is still seen through `frozen`.
        let active = Arc::clone(&self.active.read());
        let mut sources: Vec<Arc<MemTable>> = self
            .frozen
            .read()
            .iter()
            .rev()
            .map(|s| Arc::clone(s.memtable()))
            .collect();
        if !sources.iter().any(|t| Arc::ptr_eq(t, &active)) {
            sources.push(active);
        }

        // Oldest first, newer tables overwrite.
        for table in sources {
            view.extend(select(table.as_ref()));
        }
        view
    }
}

impl Flusher {
    fn spawn(inner: Arc<EngineInner>) -> Result<Self> {
        let (signal, receiver) = channel::unbounded::<()>();
        let handle = std::thread::Builder::new()
            .name("nolodb-flusher".to_string())
            .spawn(move || {
                while receiver.recv().is_ok() {
                    // Coalesce queued signals; one pass drains every snapshot.
                    while receiver.try_recv().is_ok() {}
                    if let Err(e) = inner.flush_frozen() {
                        tracing::error!(error = %e, "background flush failed, WAL retained");
                    }
                }
            })?;
        Ok(Self { signal, handle })
    }
}

/// The `({flags}, {userId})` parts of a key or key bound, when it has both
fn key_space(bound: &str) -> Option<(&str, &str)> {
    let mut parts = bound.splitn(3, '-');
    let flags = parts.next()?;
    let user = parts.next()?;
    parts.next()?;
    Some((flags, user))
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
