//! Tests for layer files and base logs
//!
//! These tests verify:
//! - Layer file naming and precedence ordering
//! - LayerWriter ordering rules and atomic publish
//! - Point lookups and streaming over sorted lines
//! - BaseLog last-line-wins semantics

use std::fs;

use nolodb::memtable::MemTableEntry;
use nolodb::storage::{BaseLog, LayerFile, LayerWriter};
use nolodb::NoloError;
use tempfile::TempDir;

fn value(v: &str) -> MemTableEntry {
    MemTableEntry::Value(v.to_string())
}

fn write_layer(dir: &std::path::Path, ts: u64, layer: u32, entries: &[(&str, MemTableEntry)]) -> LayerFile {
    let mut writer = LayerWriter::create(LayerFile::new(dir, ts, layer)).unwrap();
    for (key, entry) in entries {
        writer.add(key, entry).unwrap();
    }
    writer.finish().unwrap()
}

// =============================================================================
// Naming and Listing
// =============================================================================

#[test]
fn test_layer_file_name_round_trip() {
    let temp = TempDir::new().unwrap();
    let file = LayerFile::new(temp.path(), 1_700_000_000_123, 2);

    assert!(file.path.ends_with("data_1700000000123_layer2.nolo"));
    assert_eq!(LayerFile::parse(&file.path), Some(file));
    assert!(LayerFile::parse(&temp.path().join("index.nolo")).is_none());
}

#[test]
fn test_list_in_read_precedence_order() {
    let temp = TempDir::new().unwrap();
    for name in [
        "data_100_layer1.nolo",
        "data_300_layer0.nolo",
        "data_200_layer0.nolo",
        "data_50_layer2.nolo",
        "hash.nolo",
        "data_400_layer0.nolo.tmp",
    ] {
        fs::write(temp.path().join(name), b"").unwrap();
    }

    let order: Vec<(u32, u64)> = LayerFile::list(temp.path())
        .unwrap()
        .iter()
        .map(|f| (f.layer, f.timestamp))
        .collect();

    assert_eq!(order, vec![(0, 300), (0, 200), (1, 100), (2, 50)]);
}

// =============================================================================
// Writer
// =============================================================================

#[test]
fn test_writer_publishes_sorted_lines() {
    let temp = TempDir::new().unwrap();
    let file = write_layer(
        temp.path(),
        1,
        0,
        &[
            ("10100-alice-a", value(r#"{"n":1}"#)),
            ("10100-alice-b", MemTableEntry::Tombstone),
        ],
    );

    let text = fs::read_to_string(&file.path).unwrap();
    assert_eq!(text, "10100-alice-a {\"n\":1}\n10100-alice-b 0\n");
    assert!(!temp.path().join("data_1_layer0.nolo.tmp").exists());
}

#[test]
fn test_writer_rejects_out_of_order_keys() {
    let temp = TempDir::new().unwrap();
    let mut writer = LayerWriter::create(LayerFile::new(temp.path(), 1, 0)).unwrap();

    writer.add("b", &value("1")).unwrap();
    assert!(matches!(writer.add("a", &value("2")), Err(NoloError::Storage(_))));
    assert!(matches!(writer.add("b", &value("3")), Err(NoloError::Storage(_))));
    assert_eq!(writer.entry_count(), 1);
}

#[test]
fn test_writer_rejects_line_breaks() {
    let temp = TempDir::new().unwrap();
    let mut writer = LayerWriter::create(LayerFile::new(temp.path(), 1, 0)).unwrap();

    let result = writer.add("k", &value("line\nbreak"));
    assert!(matches!(result, Err(NoloError::MalformedInput(_))));
}

// =============================================================================
// Reads
// =============================================================================

#[test]
fn test_layer_get_and_for_each() {
    let temp = TempDir::new().unwrap();
    let file = write_layer(
        temp.path(),
        1,
        0,
        &[
            ("a", value("1")),
            ("c", MemTableEntry::Tombstone),
            ("e", value("with spaces inside")),
        ],
    );

    assert_eq!(file.get("a").unwrap(), Some(value("1")));
    assert_eq!(file.get("b").unwrap(), None);
    assert_eq!(file.get("c").unwrap(), Some(MemTableEntry::Tombstone));
    assert_eq!(file.get("e").unwrap(), Some(value("with spaces inside")));
    assert_eq!(file.get("z").unwrap(), None);

    let mut seen = Vec::new();
    file.for_each(|k, e| {
        seen.push((k.to_string(), e));
        Ok(())
    })
    .unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[1], ("c".to_string(), MemTableEntry::Tombstone));
}

// =============================================================================
// Base Log
// =============================================================================

#[test]
fn test_base_log_last_line_wins() {
    let temp = TempDir::new().unwrap();
    let log = BaseLog::new(temp.path().join("hash.nolo"));

    assert!(!log.exists());
    assert_eq!(log.get("k").unwrap(), None);
    assert!(log.load().unwrap().is_empty());

    let first = [("k", value("1")), ("other", value("x"))];
    log.append(first.iter().map(|(k, e)| (*k, e))).unwrap();
    let second = [("k", value("2"))];
    log.append(second.iter().map(|(k, e)| (*k, e))).unwrap();

    assert!(log.exists());
    assert_eq!(log.get("k").unwrap(), Some(value("2")));

    let tomb = [("other", MemTableEntry::Tombstone)];
    assert_eq!(log.append(tomb.iter().map(|(k, e)| (*k, e))).unwrap(), 1);

    let all = log.load().unwrap();
    assert_eq!(all.get("k"), Some(&value("2")));
    assert_eq!(all.get("other"), Some(&MemTableEntry::Tombstone));
}
