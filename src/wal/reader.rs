//! Log reader
//!
//! Reads the header and then records in file order. The reader remembers
//! the end of the last record that parsed cleanly, so a caller that hits a
//! damaged tail can truncate the file back to it.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use super::header::{FileHeader, HEADER_SIZE};
use super::record::LogRecord;
use crate::errors::{RedoError, RedoResult};

/// Sequential reader over one log file
pub struct FileLogReader {
    path: PathBuf,
    reader: BufReader<File>,
    header: FileHeader,
    /// End of the last good record
    last_good_offset: u64,
    file_size: u64,
    writable: bool,
}

impl FileLogReader {
    /// Opens `path` and validates its header.
    ///
    /// A writable reader may truncate the file; a read-only one never will.
    pub fn open(path: &Path, writable: bool) -> RedoResult<Self> {
        let mut file =
            File::open(path).map_err(|e| RedoError::io_at("failed to open log file", path, e))?;
        let file_size = file
            .metadata()
            .map_err(|e| RedoError::io_at("failed to stat log file", path, e))?
            .len();
        let header = FileHeader::read(&mut file).map_err(|e| e.with_path(path))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            header,
            last_good_offset: HEADER_SIZE as u64,
            file_size,
            writable,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn last_good_offset(&self) -> u64 {
        self.last_good_offset
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Reads the next record.
    ///
    /// - `Ok(Some(record))` on success
    /// - `Ok(None)` at a clean end of file
    /// - `Err` for a damaged or partial record; the offset is not advanced
    pub fn next_record(&mut self) -> RedoResult<Option<LogRecord>> {
        if self.last_good_offset >= self.file_size {
            return Ok(None);
        }
        let offset = self.last_good_offset;
        let remaining = self.file_size - offset;

        let mut prefix = [0u8; 4];
        if remaining < prefix.len() as u64 {
            return Err(self.damaged(offset, format!("{} trailing bytes", remaining)));
        }
        self.read_exact(&mut prefix, offset)?;

        let length = LogRecord::framed_length(prefix)
            .map_err(|e| self.damaged(offset, e.to_string()).with_source(e))?;
        if length as u64 > remaining {
            return Err(self.damaged(
                offset,
                format!("record of {} bytes, {} remaining", length, remaining),
            ));
        }

        let mut framed = vec![0u8; length];
        framed[..4].copy_from_slice(&prefix);
        self.read_exact(&mut framed[4..], offset)?;

        let (record, consumed) = LogRecord::deserialize(&framed)
            .map_err(|e| self.damaged(offset, e.to_string()).with_source(e))?;
        self.last_good_offset += consumed as u64;
        Ok(Some(record))
    }

    /// Cuts the file back to the last good record. Returns the number of
    /// bytes dropped.
    pub fn truncate_to_last_good(&mut self) -> RedoResult<u64> {
        if !self.writable {
            return Err(RedoError::io_at(
                "refusing to truncate a read-only log",
                &self.path,
                io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            ));
        }
        let dropped = self.file_size.saturating_sub(self.last_good_offset);
        if dropped == 0 {
            return Ok(0);
        }
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| RedoError::io_at("failed to open log for truncation", &self.path, e))?;
        file.set_len(self.last_good_offset)
            .and_then(|_| file.sync_all())
            .map_err(|e| RedoError::io_at("failed to truncate log", &self.path, e))?;
        self.file_size = self.last_good_offset;
        Ok(dropped)
    }

    /// Reads every record up to the first damaged one.
    ///
    /// Returns the records and the error that stopped the scan, if any.
    pub fn read_all(&mut self) -> (Vec<LogRecord>, Option<RedoError>) {
        let mut records = Vec::new();
        loop {
            match self.next_record() {
                Ok(Some(record)) => records.push(record),
                Ok(None) => return (records, None),
                Err(e) => return (records, Some(e)),
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8], offset: u64) -> RedoResult<()> {
        self.reader.read_exact(buf).map_err(|e| {
            RedoError::io_at(format!("failed to read record at offset {}", offset), &self.path, e)
        })
    }

    fn damaged(&self, offset: u64, detail: String) -> RedoError {
        RedoError::corruption(format!("damaged record at offset {}: {}", offset, detail))
            .with_path(&self.path)
    }
}
