//! Redo log file header
//!
//! Fixed 32 bytes at offset 0 of every log file:
//! - Magic `ZREDOLOG` (8 bytes)
//! - Format version (u16 LE)
//! - Open flag (u8), 1 while a writer has the file open
//! - Reserved (u8)
//! - Sequence (u64 LE)
//! - Create time (i64 LE, epoch millis)
//! - Checksum (u32 LE), CRC32 over the preceding 28 bytes

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::checksum::{compute_checksum, verify_trailing_checksum};
use crate::errors::{RedoError, RedoResult};

/// Header length in bytes
pub const HEADER_SIZE: usize = 32;

/// File magic
pub const MAGIC: [u8; 8] = *b"ZREDOLOG";

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

/// Parsed file header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    /// Sequence number of this log file
    pub sequence: u64,
    /// Creation time, epoch millis
    pub create_time: i64,
    /// Set while a writer has the file open
    pub open: bool,
}

impl FileHeader {
    pub fn new(sequence: u64, create_time: i64) -> Self {
        Self {
            sequence,
            create_time,
            open: false,
        }
    }

    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..10].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[10] = u8::from(self.open);
        buf[12..20].copy_from_slice(&self.sequence.to_le_bytes());
        buf[20..28].copy_from_slice(&self.create_time.to_le_bytes());
        let crc = compute_checksum(&buf[..28]);
        buf[28..32].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn deserialize(data: &[u8]) -> RedoResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(RedoError::corruption(format!(
                "log header truncated: {} bytes",
                data.len()
            ))
            .with_mismatch(HEADER_SIZE, data.len()));
        }
        let data = &data[..HEADER_SIZE];
        if data[0..8] != MAGIC {
            return Err(RedoError::corruption("not a redo log file: bad magic"));
        }
        if let Err((computed, stored)) = verify_trailing_checksum(data) {
            return Err(RedoError::corruption("log header checksum mismatch")
                .with_mismatch(format!("{:08x}", stored), format!("{:08x}", computed)));
        }
        let version = u16::from_le_bytes([data[8], data[9]]);
        if version != FORMAT_VERSION {
            return Err(RedoError::corruption("unsupported log format version")
                .with_mismatch(FORMAT_VERSION, version));
        }

        let mut seq = [0u8; 8];
        seq.copy_from_slice(&data[12..20]);
        let mut created = [0u8; 8];
        created.copy_from_slice(&data[20..28]);

        Ok(Self {
            sequence: u64::from_le_bytes(seq),
            create_time: i64::from_le_bytes(created),
            open: data[10] != 0,
        })
    }

    /// Reads the header of the file at `path`.
    pub fn read_from(path: &Path) -> RedoResult<Self> {
        let mut file =
            File::open(path).map_err(|e| RedoError::io_at("failed to open log file", path, e))?;
        Self::read(&mut file).map_err(|e| e.with_path(path))
    }

    pub(crate) fn read(file: &mut File) -> RedoResult<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_exact(&mut buf))
            .map_err(|e| RedoError::io("failed to read log header", e))?;
        Self::deserialize(&buf)
    }

    /// Overwrites the header in place. The file must not be in append mode.
    pub(crate) fn write_to(&self, path: &Path) -> RedoResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| RedoError::io_at("failed to open log file for header update", path, e))?;
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&self.serialize()))
            .and_then(|_| file.sync_data())
            .map_err(|e| RedoError::io_at("failed to write log header", path, e))
    }
}
