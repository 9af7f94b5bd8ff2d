//! Log writer
//!
//! - Appends are serialized by the writer's own mutex
//! - `force_sync` appends are fsynced before returning
//! - Other appends are fsynced by a background thread every
//!   `fsync_interval`; an interval of zero fsyncs every append
//! - Rollover never loses open transactions: their start records are
//!   copied into the next file before it becomes current
//! - Opening an existing file cuts a damaged tail back to the last whole
//!   record, so new appends never follow garbage

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;

use super::header::{FileHeader, HEADER_SIZE};
use super::reader::FileLogReader;
use super::record::LogRecord;
use crate::crash_point::{maybe_crash, points};
use crate::errors::{RedoError, RedoErrorKind, RedoResult};
use crate::observability::{log_event_with_fields, Event};
use crate::op::RedoableOp;
use crate::rollover::RolloverManager;

/// Append-only sink for log records.
pub trait LogWriter: Send + Sync {
    /// Opens (or creates) the current log file.
    fn open(&self) -> RedoResult<()>;

    /// Flushes and closes the current log file.
    fn close(&self) -> RedoResult<()>;

    /// Appends one record. Returns the number of bytes written.
    fn log(&self, record: &LogRecord, force_sync: bool) -> RedoResult<u64>;

    /// Persists buffered data.
    fn flush(&self) -> RedoResult<()>;

    /// Whether the current file has no records.
    fn is_empty(&self) -> RedoResult<bool>;

    /// Current file size in bytes, header included.
    fn size(&self) -> RedoResult<u64>;

    /// Creation time of the current file, epoch millis.
    fn create_time(&self) -> RedoResult<i64>;

    /// Sequence of the current file.
    fn sequence(&self) -> RedoResult<u64>;

    /// Archives the current file and starts the next one, carrying the
    /// start records of `active` forward. Returns the archive path.
    fn rollover(&self, active: &[Arc<dyn RedoableOp>]) -> RedoResult<PathBuf>;
}

struct OpenLog {
    file: File,
    header: FileHeader,
    size: u64,
    dirty: bool,
}

#[derive(Default)]
struct WriterState {
    log: Option<OpenLog>,
    // bumped on every open so a stale fsync thread exits
    generation: u64,
}

struct Shared {
    state: Mutex<WriterState>,
    wakeup: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// File-backed `LogWriter`.
pub struct FileLogWriter {
    sequencer: Arc<RolloverManager>,
    fsync_interval: Duration,
    shared: Arc<Shared>,
    fsync_thread: Mutex<Option<JoinHandle<()>>>,
}

impl FileLogWriter {
    pub fn new(sequencer: Arc<RolloverManager>, fsync_interval: Duration) -> Self {
        Self {
            sequencer,
            fsync_interval,
            shared: Arc::new(Shared {
                state: Mutex::new(WriterState::default()),
                wakeup: Condvar::new(),
            }),
            fsync_thread: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        self.sequencer.log_path()
    }

    fn not_open(&self) -> RedoError {
        RedoError::io_at(
            "log writer is not open",
            self.path(),
            std::io::Error::new(std::io::ErrorKind::NotConnected, "closed"),
        )
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut OpenLog) -> RedoResult<T>) -> RedoResult<T> {
        let mut state = self.shared.lock();
        match state.log.as_mut() {
            Some(log) => f(log),
            None => Err(self.not_open()),
        }
    }

    /// Opens the file at the log path, creating it with a fresh header
    /// when missing or too short to hold one.
    fn open_file(&self, sequence_if_new: u64) -> RedoResult<OpenLog> {
        let path = self.path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| RedoError::io_at("failed to create log directory", dir, e))?;
        }

        let existing_len = match fs::metadata(path) {
            Ok(m) => Some(m.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(RedoError::io_at("failed to stat log file", path, e)),
        };

        let mut header = match existing_len {
            Some(len) if len >= HEADER_SIZE as u64 => {
                let header = FileHeader::read_from(path)?;
                if header.open {
                    log_event_with_fields(
                        Event::LogUncleanClose,
                        &[("path", &path.display().to_string()), ("seq", &header.sequence.to_string())],
                    );
                }
                header
            }
            _ => {
                if existing_len.is_some() {
                    log_event_with_fields(
                        Event::LogTruncated,
                        &[("path", &path.display().to_string()), ("reason", "header incomplete")],
                    );
                }
                let header = FileHeader::new(sequence_if_new, Utc::now().timestamp_millis());
                write_new_file(path, &header, &[])?;
                header
            }
        };

        if existing_len.map_or(false, |len| len > HEADER_SIZE as u64) {
            cut_damaged_tail(path)?;
        }

        header.open = true;
        header.write_to(path)?;

        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| RedoError::io_at("failed to open log file", path, e))?;
        let size = file
            .metadata()
            .map_err(|e| RedoError::io_at("failed to stat log file", path, e))?
            .len();

        Ok(OpenLog {
            file,
            header,
            size,
            dirty: false,
        })
    }

    /// Archives the closed current file and moves the staged one into place.
    fn swap_in(&self, path: &Path, archive: &Path, temp: &Path, closed_header: &FileHeader) -> RedoResult<()> {
        closed_header.write_to(path)?;
        fs::rename(path, archive).map_err(|e| RedoError::io_at("failed to archive log file", path, e))?;
        maybe_crash(points::ROLLOVER_AFTER_ARCHIVE);

        fs::rename(temp, path)
            .map_err(|e| RedoError::io_at("failed to move new log file into place", temp, e))?;
        sync_dir(self.sequencer.log_dir())?;
        maybe_crash(points::ROLLOVER_AFTER_RENAME);
        Ok(())
    }

    /// Puts a usable file back at the log path after `swap_in` failed and
    /// reopens it. The archived file goes back when nothing replaced it.
    fn reopen_after_failed_rollover(&self, archive: &Path, temp: &Path, cause: &RedoError) -> Option<OpenLog> {
        let path = self.path();
        if !path.exists() && archive.exists() {
            if let Err(e) = fs::rename(archive, path) {
                log_event_with_fields(
                    Event::LogError,
                    &[("error", &e.to_string()), ("path", &archive.display().to_string())],
                );
            }
        }
        if path.exists() {
            let _ = fs::remove_file(temp);
        }
        let reopened = self
            .open_file(self.sequencer.current_sequence())
            .map(|log| {
                self.sequencer.init_sequence(log.header.sequence);
                log
            });
        let outcome = match &reopened {
            Ok(log) => format!("reopened seq {}", log.header.sequence),
            Err(e) => format!("reopen failed: {}", e),
        };
        log_event_with_fields(
            Event::RolloverAborted,
            &[
                ("error", &cause.to_string()),
                ("outcome", &outcome),
                ("path", &path.display().to_string()),
            ],
        );
        reopened.ok()
    }

    fn start_fsync_thread(&self, generation: u64) -> RedoResult<()> {
        if self.fsync_interval.is_zero() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let interval = self.fsync_interval;
        let handle = thread::Builder::new()
            .name("redolog-fsync".to_string())
            .spawn(move || fsync_loop(shared, interval, generation))
            .map_err(|e| RedoError::io("failed to start fsync thread", e))?;
        *self.fsync_thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    fn stop_fsync_thread(&self) {
        let handle = self.fsync_thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            self.shared.wakeup.notify_all();
            let _ = handle.join();
        }
    }
}

fn fsync_loop(shared: Arc<Shared>, interval: Duration, generation: u64) {
    let mut state = shared.lock();
    loop {
        state = shared
            .wakeup
            .wait_timeout(state, interval)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
        if state.generation != generation {
            return;
        }
        let Some(log) = state.log.as_mut() else { return };
        if log.dirty {
            match log.file.sync_data() {
                Ok(()) => log.dirty = false,
                Err(e) => log_event_with_fields(Event::FsyncFailed, &[("error", &e.to_string())]),
            }
        }
    }
}

/// Truncates `path` after its last readable record.
fn cut_damaged_tail(path: &Path) -> RedoResult<()> {
    let mut reader = FileLogReader::open(path, true)?;
    let err = loop {
        match reader.next_record() {
            Ok(Some(_)) => {}
            Ok(None) => return Ok(()),
            Err(e) if e.kind() == RedoErrorKind::Corruption => break e,
            Err(e) => return Err(e),
        }
    };
    let offset = reader.last_good_offset().to_string();
    let dropped = reader.truncate_to_last_good()?;
    log_event_with_fields(
        Event::LogTruncated,
        &[
            ("bytes", &dropped.to_string()),
            ("error", &err.to_string()),
            ("offset", &offset),
            ("path", &path.display().to_string()),
        ],
    );
    Ok(())
}

/// Writes `header` followed by `records` to a new file at `path` and syncs it.
fn write_new_file(path: &Path, header: &FileHeader, records: &[Vec<u8>]) -> RedoResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| RedoError::io_at("failed to create log file", path, e))?;
    file.write_all(&header.serialize())
        .map_err(|e| RedoError::io_at("failed to write log header", path, e))?;
    for bytes in records {
        file.write_all(bytes)
            .map_err(|e| RedoError::io_at("failed to write log record", path, e))?;
    }
    file.sync_all()
        .map_err(|e| RedoError::io_at("failed to sync log file", path, e))
}

fn sync_dir(dir: &Path) -> RedoResult<()> {
    let handle = File::open(dir).map_err(|e| RedoError::io_at("failed to open directory", dir, e))?;
    handle
        .sync_all()
        .map_err(|e| RedoError::io_at("failed to sync directory", dir, e))
}

impl LogWriter for FileLogWriter {
    fn open(&self) -> RedoResult<()> {
        let generation = {
            let mut state = self.shared.lock();
            if state.log.is_some() {
                return Ok(());
            }
            let log = self.open_file(self.sequencer.current_sequence())?;
            log_event_with_fields(
                Event::LogOpened,
                &[
                    ("path", &self.path().display().to_string()),
                    ("seq", &log.header.sequence.to_string()),
                    ("size", &log.size.to_string()),
                ],
            );
            state.log = Some(log);
            state.generation += 1;
            state.generation
        };
        self.start_fsync_thread(generation)
    }

    fn close(&self) -> RedoResult<()> {
        let closed = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.log.take()
        };
        self.stop_fsync_thread();

        let Some(mut log) = closed else { return Ok(()) };
        log.file
            .sync_all()
            .map_err(|e| RedoError::io_at("failed to sync log file on close", self.path(), e))?;
        drop(log.file);
        log.header.open = false;
        log.header.write_to(self.path())?;
        log_event_with_fields(Event::LogClosed, &[("path", &self.path().display().to_string())]);
        Ok(())
    }

    fn log(&self, record: &LogRecord, force_sync: bool) -> RedoResult<u64> {
        record.ensure_fits()?;
        let bytes = record.serialize();
        let sync_every_append = self.fsync_interval.is_zero();
        let path = self.path();
        self.with_log(|log| {
            log.file
                .write_all(&bytes)
                .map_err(|e| RedoError::io_at("failed to append log record", path, e))?;
            log.size += bytes.len() as u64;
            if force_sync || sync_every_append {
                log.file
                    .sync_data()
                    .map_err(|e| RedoError::io_at("failed to sync log file", path, e))?;
                log.dirty = false;
            } else {
                log.dirty = true;
            }
            Ok(bytes.len() as u64)
        })
    }

    fn flush(&self) -> RedoResult<()> {
        let path = self.path();
        self.with_log(|log| {
            if log.dirty {
                log.file
                    .sync_data()
                    .map_err(|e| RedoError::io_at("failed to sync log file", path, e))?;
                log.dirty = false;
            }
            Ok(())
        })
    }

    fn is_empty(&self) -> RedoResult<bool> {
        self.with_log(|log| Ok(log.size <= HEADER_SIZE as u64))
    }

    fn size(&self) -> RedoResult<u64> {
        self.with_log(|log| Ok(log.size))
    }

    fn create_time(&self) -> RedoResult<i64> {
        self.with_log(|log| Ok(log.header.create_time))
    }

    fn sequence(&self) -> RedoResult<u64> {
        self.with_log(|log| Ok(log.header.sequence))
    }

    fn rollover(&self, active: &[Arc<dyn RedoableOp>]) -> RedoResult<PathBuf> {
        let path = self.path().to_path_buf();
        let mut state = self.shared.lock();
        let Some(current) = state.log.take() else {
            return Err(self.not_open());
        };

        let old_seq = current.header.sequence;
        let mut next_header = FileHeader::new(
            RolloverManager::following(old_seq),
            Utc::now().timestamp_millis(),
        );
        next_header.open = true;

        // next file, pre-seeded with still-open transactions
        let carried: Vec<Vec<u8>> = active
            .iter()
            .filter(|op| op.is_start_marker())
            .map(|op| LogRecord::from_op(op.as_ref()).serialize())
            .collect();
        let temp = self.sequencer.temp_file();
        let staged = current
            .file
            .sync_all()
            .map_err(|e| RedoError::io_at("failed to sync log before rollover", &path, e))
            .and_then(|_| write_new_file(&temp, &next_header, &carried));
        if let Err(e) = staged {
            let _ = fs::remove_file(&temp);
            state.log = Some(current);
            return Err(e);
        }
        maybe_crash(points::ROLLOVER_AFTER_TEMP);

        let archive = match self.sequencer.rollover_file(old_seq) {
            Ok(archive) => archive,
            Err(e) => {
                let _ = fs::remove_file(&temp);
                state.log = Some(current);
                return Err(e);
            }
        };

        let mut closed_header = current.header;
        drop(current.file);
        closed_header.open = false;

        let swapped = self
            .swap_in(&path, &archive, &temp, &closed_header)
            .and_then(|_| {
                OpenOptions::new()
                    .append(true)
                    .open(&path)
                    .map_err(|e| RedoError::io_at("failed to open new log file", &path, e))
            });
        let file = match swapped {
            Ok(file) => file,
            Err(e) => {
                state.log = self.reopen_after_failed_rollover(&archive, &temp, &e);
                return Err(e);
            }
        };

        self.sequencer.increment_sequence();
        let size = HEADER_SIZE as u64 + carried.iter().map(|r| r.len() as u64).sum::<u64>();
        state.log = Some(OpenLog {
            file,
            header: next_header,
            size,
            dirty: false,
        });

        Ok(archive)
    }
}

impl Drop for FileLogWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
