//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their frame codec.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{NoloError, Result};

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing within a segment
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Set a key to a serialized value
    Set { key: String, value: String },

    /// Delete a key (tombstone)
    Delete { key: String },
}

impl Operation {
    pub fn key(&self) -> &str {
        match self {
            Operation::Set { key, .. } | Operation::Delete { key } => key,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Payload {
    operation: Operation,
    timestamp: u64,
}

impl WalEntry {
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Encode as a framed record
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(&Payload {
            operation: self.operation.clone(),
            timestamp: self.timestamp,
        })?;

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + data.len());
        buf.put_u64_le(self.lsn);
        buf.put_u32_le(crc32fast::hash(&data));
        buf.put_u32_le(data.len() as u32);
        buf.put_slice(&data);
        Ok(buf.to_vec())
    }

    /// Parse a frame header into (lsn, crc, len)
    pub(crate) fn parse_header(header: &[u8; HEADER_SIZE]) -> (u64, u32, u32) {
        let mut buf = &header[..];
        let lsn = buf.get_u64_le();
        let crc = buf.get_u32_le();
        let len = buf.get_u32_le();
        (lsn, crc, len)
    }

    /// Decode a frame body once the header has been read
    pub(crate) fn from_parts(lsn: u64, crc: u32, data: &[u8]) -> Result<Self> {
        let actual = crc32fast::hash(data);
        if actual != crc {
            return Err(NoloError::WalCorruption(format!(
                "CRC mismatch at lsn {}: expected {:08x}, got {:08x}",
                lsn, crc, actual
            )));
        }
        let payload: Payload = bincode::deserialize(data)
            .map_err(|e| NoloError::WalCorruption(format!("bad payload at lsn {}: {}", lsn, e)))?;
        Ok(Self {
            lsn,
            operation: payload.operation,
            timestamp: payload.timestamp,
        })
    }

    /// Decode one complete frame
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(NoloError::WalCorruption(format!(
                "frame too short: {} bytes",
                bytes.len()
            )));
        }
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&bytes[..HEADER_SIZE]);
        let (lsn, crc, len) = Self::parse_header(&header);
        let body = &bytes[HEADER_SIZE..];
        if body.len() != len as usize {
            return Err(NoloError::WalCorruption(format!(
                "frame length mismatch at lsn {}: header says {}, got {}",
                lsn,
                len,
                body.len()
            )));
        }
        Self::from_parts(lsn, crc, body)
    }
}
