//! Log file sequencing and crash-safe rollover
//!
//! - Tracks the sequence number of the current log file
//! - Names archive targets for rolled-over files
//! - Repairs the log directory after a crash in the middle of a rollover
//!
//! A rollover writes the next file under a temporary name in the log
//! directory, moves the current file into the archive, then renames the
//! temporary file into place. If the process dies between the last two
//! steps the current file is missing and the newest temporary file is the
//! one that was about to become current.

mod archive;

pub use archive::{archive_file_name, list_archives, parse_archive_sequence, ArchivedLog};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use chrono::Utc;

use crate::errors::{RedoError, RedoResult};
use crate::observability::{log_event_with_fields, Event};

/// Prefix of temporary rollover files
pub const TEMP_PREFIX: &str = "~tmp-redo-";

/// Suffix appended to stale temporary files
pub const BACKUP_SUFFIX: &str = ".bak";

/// Sequencer for one logical log
#[derive(Debug)]
pub struct RolloverManager {
    log_path: PathBuf,
    archive_dir: PathBuf,
    sequence: Mutex<u64>,
}

impl RolloverManager {
    pub fn new(log_path: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            archive_dir: archive_dir.into(),
            sequence: Mutex::new(0),
        }
    }

    /// Path of the current log file
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Directory holding the current log and temporary rollover files
    pub fn log_dir(&self) -> &Path {
        self.log_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn current_sequence(&self) -> u64 {
        *self.sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn init_sequence(&self, seq: u64) {
        *self.sequence.lock().unwrap_or_else(PoisonError::into_inner) = seq;
    }

    /// Sequence that follows `seq`, wrapping to 0 after `u64::MAX`.
    pub fn following(seq: u64) -> u64 {
        if seq == u64::MAX {
            0
        } else {
            seq + 1
        }
    }

    /// Advances the sequence and returns the new value.
    pub fn increment_sequence(&self) -> u64 {
        let mut seq = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        *seq = Self::following(*seq);
        *seq
    }

    /// Archive path for the file written under `seq`. Creates the archive
    /// directory if needed.
    pub fn rollover_file(&self, seq: u64) -> RedoResult<PathBuf> {
        fs::create_dir_all(&self.archive_dir).map_err(|e| {
            RedoError::io_at("failed to create archive directory", &self.archive_dir, e)
        })?;
        let mut at = Utc::now();
        let mut path = self.archive_dir.join(archive_file_name(seq, at));
        // same sequence archived twice within one millisecond
        while path.exists() {
            at += chrono::Duration::milliseconds(1);
            path = self.archive_dir.join(archive_file_name(seq, at));
        }
        Ok(path)
    }

    /// Fresh temporary file path in the log directory.
    pub fn temp_file(&self) -> PathBuf {
        self.log_dir()
            .join(format!("{}{}.log", TEMP_PREFIX, Utc::now().timestamp_millis()))
    }

    /// Archived logs sorted by sequence.
    pub fn archived_logs(&self) -> RedoResult<Vec<ArchivedLog>> {
        list_archives(&self.archive_dir)
    }

    /// Archived logs with sequence `seq` or later, sorted by sequence.
    pub fn archived_logs_from_sequence(&self, seq: u64) -> RedoResult<Vec<ArchivedLog>> {
        let mut logs = self.archived_logs()?;
        logs.retain(|log| log.sequence >= seq);
        Ok(logs)
    }

    /// Repairs the log directory after a crash during rollover.
    ///
    /// Any failure to rename is fatal.
    pub fn crash_recovery(&self) -> RedoResult<()> {
        let mut temps = self.temp_files()?;
        if temps.is_empty() {
            return Ok(());
        }

        if !self.log_path.exists() {
            // newest last
            temps.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            if let Some((newest, _)) = temps.pop() {
                fs::rename(&newest, &self.log_path).map_err(|e| {
                    RedoError::rollover_recovery_failed(
                        "failed to rename temporary rollover file into place",
                        &newest,
                        e,
                    )
                })?;
                log_event_with_fields(
                    Event::RolloverRecovered,
                    &[
                        ("from", &newest.display().to_string()),
                        ("to", &self.log_path.display().to_string()),
                    ],
                );
            }
        }

        for (temp, _) in temps {
            let mut backup = temp.clone().into_os_string();
            backup.push(BACKUP_SUFFIX);
            let backup = PathBuf::from(backup);
            fs::rename(&temp, &backup).map_err(|e| {
                RedoError::rollover_recovery_failed(
                    "failed to back up stale temporary rollover file",
                    &temp,
                    e,
                )
            })?;
            log_event_with_fields(
                Event::RolloverTempBackedUp,
                &[("path", &backup.display().to_string())],
            );
        }
        Ok(())
    }

    fn temp_files(&self) -> RedoResult<Vec<(PathBuf, SystemTime)>> {
        let dir = self.log_dir();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RedoError::rollover_recovery_failed("failed to list log directory", dir, e)),
        };

        let mut temps = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| RedoError::rollover_recovery_failed("failed to list log directory", dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(TEMP_PREFIX) || name.ends_with(BACKUP_SUFFIX) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            temps.push((entry.path(), modified));
        }
        Ok(temps)
    }
}
