//! Tests for StorageManager
//!
//! These tests verify:
//! - Opening/creating storage directories
//! - Flushing memtables to per-user layer files and hash logs
//! - Read precedence across layers and the base log
//! - Compaction, including when tombstones may be dropped
//! - Persistence (restart and rediscover files)

use std::collections::HashSet;
use std::path::PathBuf;

use nolodb::key::DbKey;
use nolodb::memtable::{MemTable, MemTableEntry};
use nolodb::storage::StorageManager;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const MERGE_THRESHOLD: usize = 3;

fn setup_temp_storage() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

fn memtable_with(entries: &[(&str, Option<&str>)]) -> MemTable {
    let memtable = MemTable::new();
    for (key, value) in entries {
        match value {
            Some(v) => memtable.put(key.to_string(), v.to_string()),
            None => memtable.delete(key.to_string()),
        };
    }
    memtable
}

fn get(manager: &StorageManager, key: &str) -> Option<MemTableEntry> {
    manager.get(&DbKey::parse(key).unwrap()).unwrap()
}

fn value(v: &str) -> Option<MemTableEntry> {
    Some(MemTableEntry::Value(v.to_string()))
}

// =============================================================================
// Open/Create Tests
// =============================================================================

#[test]
fn test_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("new_storage");

    assert!(!path.exists());

    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    assert!(path.is_dir());
    assert!(manager.users().unwrap().is_empty());
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_flush_splits_by_user_and_family() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    let memtable = memtable_with(&[
        ("10100-alice-a", Some(r#"{"n":1}"#)),
        ("00010-alice-h", Some("hashed")),
        ("10100-bob-a", Some(r#"{"n":2}"#)),
    ]);
    let users = manager.flush(&memtable).unwrap();

    assert_eq!(users, vec!["alice".to_string(), "bob".to_string()]);
    assert_eq!(manager.users().unwrap(), users);

    assert_eq!(manager.layer_files("alice").unwrap().len(), 1);
    assert_eq!(manager.layer_files("bob").unwrap().len(), 1);
    assert!(manager.hash_log("alice").exists());
    assert!(!manager.hash_log("bob").exists());

    assert_eq!(get(&manager, "10100-alice-a"), value(r#"{"n":1}"#));
    assert_eq!(get(&manager, "00010-alice-h"), value("hashed"));
    assert_eq!(get(&manager, "10100-bob-a"), value(r#"{"n":2}"#));
    assert_eq!(get(&manager, "10100-bob-missing"), None);
}

#[test]
fn test_flush_only_hash_keys_makes_no_layer_file() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    manager
        .flush(&memtable_with(&[("00010-alice-h1", Some("1")), ("00010-alice-h2", None)]))
        .unwrap();

    assert!(manager.layer_files("alice").unwrap().is_empty());
    assert_eq!(get(&manager, "00010-alice-h2"), Some(MemTableEntry::Tombstone));
}

#[test]
fn test_flush_rejects_unparseable_keys() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    assert!(manager.flush(&memtable_with(&[("not-a-key", Some("v"))])).is_err());
}

// =============================================================================
// Read Precedence Tests
// =============================================================================

#[test]
fn test_newer_layer_file_wins() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    manager.flush(&memtable_with(&[("10100-alice-a", Some("old"))])).unwrap();
    manager.flush(&memtable_with(&[("10100-alice-a", Some("new"))])).unwrap();

    assert_eq!(get(&manager, "10100-alice-a"), value("new"));
}

#[test]
fn test_layer_shadows_index_log() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    std::fs::create_dir_all(manager.user_dir("alice")).unwrap();
    let base = [
        ("10100-alice-a", MemTableEntry::Value("base-a".into())),
        ("10100-alice-b", MemTableEntry::Value("base-b".into())),
    ];
    manager
        .index_log("alice")
        .append(base.iter().map(|(k, e)| (*k, e)))
        .unwrap();

    manager.flush(&memtable_with(&[("10100-alice-a", Some("layer-a"))])).unwrap();

    assert_eq!(get(&manager, "10100-alice-a"), value("layer-a"));
    assert_eq!(get(&manager, "10100-alice-b"), value("base-b"));
}

#[test]
fn test_visit_user_yields_newest_once() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    manager
        .flush(&memtable_with(&[("10100-alice-a", Some("1")), ("10100-alice-b", Some("1"))]))
        .unwrap();
    manager
        .flush(&memtable_with(&[("10100-alice-a", Some("2")), ("00010-alice-h", Some("h"))]))
        .unwrap();

    let shadowed: HashSet<String> = ["10100-alice-b".to_string()].into_iter().collect();
    let mut seen = Vec::new();
    manager
        .visit_user("alice", &shadowed, |k, e| {
            seen.push((k.to_string(), e));
            Ok(())
        })
        .unwrap();

    seen.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        seen,
        vec![
            ("00010-alice-h".to_string(), MemTableEntry::Value("h".into())),
            ("10100-alice-a".to_string(), MemTableEntry::Value("2".into())),
        ]
    );
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_no_merge_below_threshold() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    for i in 0..2 {
        manager.flush(&memtable_with(&[("10100-alice-a", Some(i.to_string().as_str()))])).unwrap();
    }

    assert!(manager.merge_layer_files_if_needed("alice").unwrap().is_empty());
    assert_eq!(manager.layer_counts("alice").unwrap().get(&0), Some(&2));
}

#[test]
fn test_merge_keeps_latest_value() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    manager.flush(&memtable_with(&[("10100-alice-a", Some("v1")), ("10100-alice-b", Some("b"))])).unwrap();
    manager.flush(&memtable_with(&[("10100-alice-a", Some("v2"))])).unwrap();
    manager.flush(&memtable_with(&[("10100-alice-a", Some("v3"))])).unwrap();

    let reports = manager.merge_layer_files_if_needed("alice").unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].from_layer, 0);
    assert_eq!(reports[0].inputs, 3);
    assert_eq!(reports[0].entries_written, 2);

    let counts = manager.layer_counts("alice").unwrap();
    assert_eq!(counts.get(&0), None);
    assert_eq!(counts.get(&1), Some(&1));

    assert_eq!(get(&manager, "10100-alice-a"), value("v3"));
    assert_eq!(get(&manager, "10100-alice-b"), value("b"));
}

#[test]
fn test_top_layer_merge_drops_tombstones() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    manager.flush(&memtable_with(&[("10100-alice-a", Some("v"))])).unwrap();
    manager.flush(&memtable_with(&[("10100-alice-a", None)])).unwrap();
    manager.flush(&memtable_with(&[("10100-alice-b", Some("b"))])).unwrap();

    let reports = manager.merge_layer_files_if_needed("alice").unwrap();

    assert_eq!(reports[0].tombstones_dropped, 1);
    assert_eq!(get(&manager, "10100-alice-a"), None);
}

#[test]
fn test_tombstones_kept_below_top_layer() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    // First round builds a layer-1 file that still holds "a".
    for i in 0..3 {
        manager.flush(&memtable_with(&[("10100-alice-a", Some(format!("v{}", i).as_str()))])).unwrap();
    }
    manager.merge_layer_files_if_needed("alice").unwrap();

    // Second round deletes "a"; layer 1 is now the top.
    manager.flush(&memtable_with(&[("10100-alice-a", None)])).unwrap();
    manager.flush(&memtable_with(&[("10100-alice-c", Some("c"))])).unwrap();
    manager.flush(&memtable_with(&[("10100-alice-d", Some("d"))])).unwrap();
    let reports = manager.merge_layer_files_if_needed("alice").unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].tombstones_dropped, 0);
    assert_eq!(manager.layer_counts("alice").unwrap().get(&1), Some(&2));
    assert_eq!(get(&manager, "10100-alice-a"), Some(MemTableEntry::Tombstone));
}

#[test]
fn test_tombstones_kept_when_index_log_exists() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    std::fs::create_dir_all(manager.user_dir("alice")).unwrap();
    let base = [("10100-alice-a", MemTableEntry::Value("base".into()))];
    manager
        .index_log("alice")
        .append(base.iter().map(|(k, e)| (*k, e)))
        .unwrap();

    manager.flush(&memtable_with(&[("10100-alice-a", None)])).unwrap();
    manager.flush(&memtable_with(&[("10100-alice-b", Some("b"))])).unwrap();
    manager.flush(&memtable_with(&[("10100-alice-c", Some("c"))])).unwrap();

    let reports = manager.merge_layer_files_if_needed("alice").unwrap();

    assert_eq!(reports[0].tombstones_dropped, 0);
    // The tombstone still shadows the base log entry
    assert_eq!(get(&manager, "10100-alice-a"), Some(MemTableEntry::Tombstone));
}

#[test]
fn test_cascading_merge() {
    let (_temp, path) = setup_temp_storage();
    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();

    for round in 0..3 {
        for i in 0..3 {
            let key = format!("10100-alice-k{}", round * 3 + i);
            manager.flush(&memtable_with(&[(key.as_str(), Some("v"))])).unwrap();
        }
        manager.merge_layer_files_if_needed("alice").unwrap();
    }

    let counts = manager.layer_counts("alice").unwrap();
    assert_eq!(counts.get(&1), None);
    assert_eq!(counts.get(&2), Some(&1));
    for i in 0..9 {
        assert_eq!(get(&manager, &format!("10100-alice-k{}", i)), value("v"));
    }
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_rediscovers_files() {
    let (_temp, path) = setup_temp_storage();

    {
        let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();
        manager
            .flush(&memtable_with(&[("10100-alice-a", Some("persisted")), ("00010-alice-h", Some("h"))]))
            .unwrap();
    }

    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();
    assert_eq!(get(&manager, "10100-alice-a"), value("persisted"));
    assert_eq!(get(&manager, "00010-alice-h"), value("h"));
}

#[test]
fn test_flush_after_reopen_outranks_future_stamped_files() {
    use nolodb::storage::{LayerFile, LayerWriter};
    use std::time::{SystemTime, UNIX_EPOCH};

    let (_temp, path) = setup_temp_storage();
    let user_dir = path.join("alice");
    std::fs::create_dir_all(&user_dir).unwrap();

    // Written by a process whose clock ran a minute ahead
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64;
    let future = LayerFile::new(&user_dir, now + 60_000, 0);
    let mut writer = LayerWriter::create(future.clone()).unwrap();
    writer
        .add("10100-alice-k", &MemTableEntry::Value("1".to_string()))
        .unwrap();
    writer.finish().unwrap();

    let manager = StorageManager::open(&path, MERGE_THRESHOLD).unwrap();
    manager
        .flush(&memtable_with(&[("10100-alice-k", Some("2"))]))
        .unwrap();

    let files = manager.layer_files("alice").unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[0].timestamp > future.timestamp);
    assert_eq!(get(&manager, "10100-alice-k"), value("2"));
}
