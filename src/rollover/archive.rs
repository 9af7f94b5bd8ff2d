//! Archive file naming and listing
//!
//! Archived logs are named `redo-<yyyyMMdd.HHmmss.SSS>-seq<N>.log`, where
//! the timestamp is the rollover time (UTC) and N the sequence the file
//! was written under.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::errors::{RedoError, RedoResult};

const ARCHIVE_PREFIX: &str = "redo-";
const SEQ_MARKER: &str = "-seq";
const LOG_EXTENSION: &str = ".log";

/// One archived log file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedLog {
    pub path: PathBuf,
    pub sequence: u64,
}

/// File name for the archive of sequence `seq` rolled over at `at`.
pub fn archive_file_name(seq: u64, at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}{}{}",
        ARCHIVE_PREFIX,
        at.format("%Y%m%d.%H%M%S%.3f"),
        SEQ_MARKER,
        seq,
        LOG_EXTENSION
    )
}

/// Sequence encoded in an archive file name, if it is one.
pub fn parse_archive_sequence(name: &str) -> Option<u64> {
    let stem = name.strip_prefix(ARCHIVE_PREFIX)?.strip_suffix(LOG_EXTENSION)?;
    let (_, seq) = stem.rsplit_once(SEQ_MARKER)?;
    seq.parse().ok()
}

/// All archived logs in `dir`, sorted by sequence. A missing directory
/// has no archives.
pub fn list_archives(dir: &Path) -> RedoResult<Vec<ArchivedLog>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RedoError::io_at("failed to list archive directory", dir, e)),
    };

    let mut logs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RedoError::io_at("failed to list archive directory", dir, e))?;
        let name = entry.file_name();
        let Some(sequence) = name.to_str().and_then(parse_archive_sequence) else {
            continue;
        };
        logs.push(ArchivedLog {
            path: entry.path(),
            sequence,
        });
    }
    logs.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.path.cmp(&b.path)));
    Ok(logs)
}
