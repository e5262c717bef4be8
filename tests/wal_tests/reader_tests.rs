//! Tests for WAL Reader
//!
//! These tests verify:
//! - Reading entries back in order
//! - Clean end of file
//! - Torn tails and corrupted frames surface as errors

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use nolodb::config::WalSyncStrategy;
use nolodb::wal::{Operation, WalReader, WalWriter};
use nolodb::NoloError;
use tempfile::TempDir;

fn write_entries(count: usize) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wal_1_0.log");

    let mut writer = WalWriter::open(&path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer
            .append(Operation::Set {
                key: format!("key{}", i),
                value: format!("value{}", i),
            })
            .unwrap();
    }
    (temp_dir, path)
}

#[test]
fn test_read_empty_file() {
    let (_temp, path) = write_entries(0);

    let mut reader = WalReader::open(&path).unwrap();
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), 0);
}

#[test]
fn test_read_entries_in_order() {
    let (_temp, path) = write_entries(5);

    let mut reader = WalReader::open(&path).unwrap();
    for i in 0..5 {
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.lsn, i as u64 + 1);
        assert_eq!(
            entry.operation,
            Operation::Set {
                key: format!("key{}", i),
                value: format!("value{}", i),
            }
        );
    }
    assert!(reader.next_entry().unwrap().is_none());

    let file_len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(reader.position(), file_len);
}

#[test]
fn test_iterator_collects_all() {
    let (_temp, path) = write_entries(20);

    let entries: Vec<_> = WalReader::open(&path).unwrap().entries().collect();
    assert_eq!(entries.len(), 20);
    assert!(entries.iter().all(|e| e.is_ok()));
}

#[test]
fn test_partial_header_is_corruption() {
    let (_temp, path) = write_entries(2);
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[1, 2, 3]).unwrap();

    let results: Vec<_> = WalReader::open(&path).unwrap().entries().collect();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok() && results[1].is_ok());
    assert!(matches!(results[2], Err(NoloError::WalCorruption(_))));
}

#[test]
fn test_partial_body_does_not_advance() {
    let (_temp, path) = write_entries(1);
    let good_len = std::fs::metadata(&path).unwrap().len();

    // A header that promises 100 bytes, followed by only 10
    let mut torn = Vec::new();
    torn.extend_from_slice(&2u64.to_le_bytes());
    torn.extend_from_slice(&0u32.to_le_bytes());
    torn.extend_from_slice(&100u32.to_le_bytes());
    torn.extend_from_slice(&[0u8; 10]);
    OpenOptions::new().append(true).open(&path).unwrap().write_all(&torn).unwrap();

    let mut reader = WalReader::open(&path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert!(matches!(reader.next_entry(), Err(NoloError::WalCorruption(_))));
    assert_eq!(reader.position(), good_len);
}

#[test]
fn test_crc_mismatch_advances_past_frame() {
    let (_temp, path) = write_entries(2);
    let mut bytes = std::fs::read(&path).unwrap();
    // Flip the first payload byte of entry 1
    bytes[16] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let mut reader = WalReader::open(&path).unwrap();
    assert!(matches!(reader.next_entry(), Err(NoloError::WalCorruption(_))));
    assert!(reader.position() > 0);

    let second = reader.next_entry().unwrap().unwrap();
    assert_eq!(second.lsn, 2);
}
