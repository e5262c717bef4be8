//! WAL Recovery
//!
//! Handles crash recovery by replaying a WAL segment.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::{NoloError, Result};

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Skip complete frames whose checksum does not match
    /// 3. Truncate a partial write at the end
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result, valid_len) = Self::scan(path)?;

        if result.was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
            tracing::warn!(
                path = %path.display(),
                valid_len,
                "truncated partial write at end of WAL segment"
            );
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path).map(|(_, result, _)| result)
    }

    fn scan(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult, u64)> {
        let file_len = std::fs::metadata(path)?.len();
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        loop {
            let before = reader.position();
            match reader.next_entry() {
                Ok(Some(entry)) => {
                    result.entries_recovered += 1;
                    result.last_lsn = result.last_lsn.max(entry.lsn);
                    entries.push(entry);
                }
                Ok(None) => break,
                Err(NoloError::WalCorruption(reason)) if reader.position() > before => {
                    tracing::warn!(path = %path.display(), %reason, "skipping corrupted WAL entry");
                    result.entries_corrupted += 1;
                }
                Err(NoloError::WalCorruption(reason)) => {
                    tracing::debug!(path = %path.display(), %reason, "WAL ends in a partial write");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let valid_len = reader.position();
        result.was_truncated = valid_len < file_len;
        Ok((entries, result, valid_len))
    }
}
