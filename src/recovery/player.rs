//! Log scanning state machine
//!
//! Feeds records through the active transaction table:
//!
//! - start record: insert, unless its end record was already seen
//! - end record: remove; with no matching start it is an orphan
//! - checkpoint: compare its id set with the table
//!
//! None of these anomalies stops a scan. They are logged and counted.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::errors::{RedoError, RedoResult};
use crate::manager::ActiveOps;
use crate::observability::{log_event_with_fields, Event};
use crate::op::{Checkpoint, OpRegistry, OpType, RedoableOp};
use crate::txn::TransactionId;
use crate::wal::{FileLogReader, LogRecord};

/// What a scan saw
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files: u64,
    pub records: u64,
    /// End records without a start
    pub orphans: Vec<TransactionId>,
    /// Start records that arrived after their own end record
    pub late_starts: Vec<TransactionId>,
    pub checkpoint_mismatches: u64,
    /// Bytes cut from damaged tails
    pub truncated_bytes: u64,
    /// Damaged tails left in place because the log was read-only
    pub ignored_tails: u64,
}

/// Replays log files into an active transaction table.
pub struct RedoPlayer {
    registry: Arc<OpRegistry>,
    writable: bool,
    active: ActiveOps,
    orphans: HashSet<TransactionId>,
    stats: ScanStats,
}

impl RedoPlayer {
    /// A writable player truncates damaged tails; a read-only one only
    /// warns.
    pub fn new(registry: Arc<OpRegistry>, writable: bool) -> Self {
        Self {
            registry,
            writable,
            active: ActiveOps::new(),
            orphans: HashSet::new(),
            stats: ScanStats::default(),
        }
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Transactions still open, in start order
    pub fn uncommitted(&self) -> Vec<Arc<dyn RedoableOp>> {
        self.active.ops()
    }

    pub fn is_orphan(&self, txn_id: &TransactionId) -> bool {
        self.orphans.contains(txn_id)
    }

    /// Scans one file. Files must be scanned oldest first.
    ///
    /// Fails only when the file cannot be opened or its header is bad. A
    /// damaged record ends the scan of this file.
    pub fn scan_file(&mut self, path: &Path) -> RedoResult<()> {
        let mut reader = FileLogReader::open(path, self.writable)?;
        self.stats.files += 1;

        loop {
            match reader.next_record() {
                Ok(Some(record)) => self.process(&record),
                Ok(None) => break,
                Err(err) => {
                    self.damaged_tail(&mut reader, &err)?;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Applies one record to the table.
    pub fn process(&mut self, record: &LogRecord) {
        self.stats.records += 1;

        if record.op_type == OpType::CHECKPOINT {
            match Checkpoint::from_record(record) {
                Ok(ckpt) => self.compare_checkpoint(&ckpt),
                Err(err) => log_event_with_fields(
                    Event::CheckpointMismatch,
                    &[("error", &err.to_string()), ("txn", &record.txn_id.to_string())],
                ),
            }
            return;
        }

        let txn_id = record.txn_id;
        if record.is_start_marker() {
            if self.orphans.contains(&txn_id) {
                // its end record came first, the transaction is already over
                self.stats.late_starts.push(txn_id);
                log_event_with_fields(
                    Event::LateStart,
                    &[("op", &record.op_type.to_string()), ("txn", &txn_id.to_string())],
                );
            } else {
                self.active.put(self.registry.decode(record));
            }
        }
        if record.is_end_marker() && self.active.remove(&txn_id).is_none() {
            self.orphans.insert(txn_id);
            self.stats.orphans.push(txn_id);
            log_event_with_fields(
                Event::OrphanFound,
                &[("op", &record.op_type.to_string()), ("txn", &txn_id.to_string())],
            );
        }
    }

    fn compare_checkpoint(&mut self, ckpt: &Checkpoint) {
        let expected: HashSet<TransactionId> = ckpt.active_txns().iter().copied().collect();
        let actual: HashSet<TransactionId> = self.active.ids().into_iter().collect();
        if expected == actual {
            return;
        }
        self.stats.checkpoint_mismatches += 1;
        let missing = expected.difference(&actual).count();
        let unexpected = actual.difference(&expected).count();
        log_event_with_fields(
            Event::CheckpointMismatch,
            &[
                ("checkpoint_size", &expected.len().to_string()),
                ("table_size", &actual.len().to_string()),
                ("missing", &missing.to_string()),
                ("unexpected", &unexpected.to_string()),
            ],
        );
    }

    fn damaged_tail(&mut self, reader: &mut FileLogReader, err: &RedoError) -> RedoResult<()> {
        let path = reader.path().display().to_string();
        let offset = reader.last_good_offset().to_string();
        if self.writable {
            let dropped = reader.truncate_to_last_good()?;
            self.stats.truncated_bytes += dropped;
            log_event_with_fields(
                Event::LogTruncated,
                &[
                    ("bytes", &dropped.to_string()),
                    ("error", &err.to_string()),
                    ("offset", &offset),
                    ("path", &path),
                ],
            );
        } else {
            self.stats.ignored_tails += 1;
            log_event_with_fields(
                Event::LogTailIgnored,
                &[("error", &err.to_string()), ("offset", &offset), ("path", &path)],
            );
        }
        Ok(())
    }
}
