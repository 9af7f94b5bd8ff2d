//! Redo log storage
//!
//! One current file per log, appended to under the writer's mutex, plus
//! immutable archived files produced by rollover.
//!
//! # File layout
//!
//! - 32-byte header (magic, version, open flag, sequence, create time, CRC)
//! - Framed records: length | body | CRC32
//!
//! A damaged tail can only come from a crash mid-append or from real
//! corruption. The reader cannot tell the two apart; callers decide
//! whether to truncate.

mod checksum;
mod header;
mod reader;
mod record;
mod writer;

pub use checksum::{compute_checksum, verify_checksum};
pub use header::{FileHeader, FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use reader::FileLogReader;
pub use record::{DecodeError, LogRecord, RecordFlags, MAX_RECORD_SIZE, MIN_RECORD_SIZE};
pub use writer::{FileLogWriter, LogWriter};
