//! WAL Reader
//!
//! Handles reading entries from a WAL segment.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{NoloError, Result};

use super::{WalEntry, HEADER_SIZE};

/// Frames claiming more than this are treated as a torn header
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Reads entries from a WAL segment
pub struct WalReader {
    reader: BufReader<File>,
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
            position: 0,
        })
    }

    /// Byte offset just past the last entry returned
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next entry from the WAL.
    ///
    /// `Ok(None)` at a clean end of file. A torn tail (header or body cut
    /// short) and a checksum mismatch both surface as `WalCorruption`; the
    /// position only advances past complete frames.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut header = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(None),
            n if n < HEADER_SIZE => {
                return Err(NoloError::WalCorruption(format!(
                    "partial header at offset {} ({} bytes)",
                    self.position, n
                )))
            }
            _ => {}
        }

        let (lsn, crc, len) = WalEntry::parse_header(&header);
        if len > MAX_FRAME_LEN {
            return Err(NoloError::WalCorruption(format!(
                "implausible frame length {} at offset {}",
                len, self.position
            )));
        }
        let mut data = vec![0u8; len as usize];
        let n = read_full(&mut self.reader, &mut data)?;
        if n < data.len() {
            return Err(NoloError::WalCorruption(format!(
                "partial entry at offset {} (lsn {}, {}/{} bytes)",
                self.position, lsn, n, len
            )));
        }

        let frame_end = self.position + (HEADER_SIZE + data.len()) as u64;
        let entry = WalEntry::from_parts(lsn, crc, &data);
        // A complete frame is consumed even when its checksum is wrong.
        self.position = frame_end;
        entry.map(Some)
    }

    /// Iterate over entries until end of file or the first error
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read until `buf` is full or EOF, returning the byte count
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
