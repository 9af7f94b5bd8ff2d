//! Shared state behind `RedoLogManager`
//!
//! Everything here is reachable from the deferred recovery thread too, so
//! the manager holds it in an `Arc`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::active::ActiveOps;
use super::lock::LogLock;
use super::policy::{RedoLogPolicy, RolloverCheck, RolloverLimits};
use crate::config::RedoConfig;
use crate::crash_point::{maybe_crash, points};
use crate::errors::{RedoError, RedoResult};
use crate::observability::{log_event_at, log_event_with_fields, Event, RedoMetrics, Severity};
use crate::op::{Checkpoint, OpRegistry, RedoableOp};
use crate::recovery::TerminalLog;
use crate::rollover::RolloverManager;
use crate::txn::{TransactionId, TxnIdGenerator};
use crate::wal::{LogRecord, LogWriter};

pub(crate) struct LogCore {
    pub(crate) config: RedoConfig,
    pub(crate) policy: Arc<dyn RedoLogPolicy>,
    pub(crate) lock: LogLock,
    pub(crate) active: ActiveOps,
    pub(crate) sequencer: Arc<RolloverManager>,
    pub(crate) writer: Arc<dyn LogWriter>,
    pub(crate) registry: Arc<OpRegistry>,
    pub(crate) metrics: RedoMetrics,
    txn_ids: TxnIdGenerator,
    limits: RolloverLimits,
    pub(crate) enabled: AtomicBool,
    pub(crate) recovery_mode: AtomicBool,
    pub(crate) in_crash_recovery: AtomicBool,
    pub(crate) shutting_down: AtomicBool,
    pub(crate) cancel_deferred: AtomicBool,
    initial_size: AtomicU64,
}

impl LogCore {
    pub(crate) fn new(config: RedoConfig, policy: Arc<dyn RedoLogPolicy>, registry: OpRegistry) -> Self {
        let sequencer = Arc::new(RolloverManager::new(&config.log_path, &config.archive_dir));
        let writer = policy.create_log_writer(&config, Arc::clone(&sequencer));
        let limits = RolloverLimits::from_config(&config);
        let enabled = config.enabled;
        Self {
            config,
            policy,
            lock: LogLock::new(),
            active: ActiveOps::new(),
            sequencer,
            writer,
            registry: Arc::new(registry),
            metrics: RedoMetrics::new(),
            txn_ids: TxnIdGenerator::new(),
            limits,
            enabled: AtomicBool::new(enabled),
            recovery_mode: AtomicBool::new(false),
            in_crash_recovery: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            cancel_deferred: AtomicBool::new(false),
            initial_size: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn new_txn_id(&self) -> TransactionId {
        self.txn_ids.next_id()
    }

    pub(crate) fn signal(&self, err: RedoError) -> RedoError {
        self.metrics.increment_log_errors();
        self.policy.signal_log_error(err)
    }

    /// Reports an abandoned lock wait; benign during shutdown.
    pub(crate) fn lock_interrupted(&self, err: RedoError) -> RedoError {
        let severity = if self.shutting_down.load(Ordering::SeqCst) {
            Severity::Info
        } else {
            Severity::Warn
        };
        log_event_at(severity, Event::LockInterrupted, &[("error", &err.to_string())]);
        err
    }

    /// Appends without taking the log lock. Callers hold it in either mode.
    ///
    /// The active table is updated before the write, so a failed write
    /// never leaves the table behind the log. A record too large to frame
    /// is refused before the table is touched.
    pub(crate) fn append(&self, op: &Arc<dyn RedoableOp>, force_sync: bool) -> RedoResult<()> {
        let record = LogRecord::from_op(op.as_ref());
        record.ensure_fits().map_err(|e| self.signal(e))?;
        self.active.apply(op);
        let started = Instant::now();
        let bytes = self.writer.log(&record, force_sync).map_err(|e| self.signal(e))?;
        self.metrics.record_logged(bytes, started.elapsed());
        Ok(())
    }

    /// Appends under the shared lock.
    pub(crate) fn log_only(&self, op: &Arc<dyn RedoableOp>, force_sync: bool) -> RedoResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let _shared = self.shared()?;
        self.append(op, force_sync)
    }

    /// Shared hold for one append. Refused once shutdown has begun.
    pub(crate) fn shared(&self) -> RedoResult<super::lock::ReadGuard<'_>> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(self.lock_interrupted(RedoError::lock_interrupted("redo log is shutting down")));
        }
        self.lock.read().map_err(|e| self.lock_interrupted(e))
    }

    /// Appends under the shared lock and returns the sequence of the file
    /// the record landed in.
    pub(crate) fn log_in_sequence(&self, op: &Arc<dyn RedoableOp>, force_sync: bool) -> RedoResult<u64> {
        let _shared = self.shared()?;
        self.append(op, force_sync)?;
        self.writer.sequence().map_err(|e| self.signal(e))
    }

    fn rollover_check(&self, immediate: bool) -> RedoResult<RolloverCheck> {
        let size = self.writer.size()?;
        let is_empty = self.writer.is_empty()?;
        let now = Utc::now().timestamp_millis();
        let created = self.writer.create_time()?.min(now);
        Ok(RolloverCheck {
            immediate,
            is_empty,
            size,
            initial_size: self.initial_size.load(Ordering::SeqCst),
            age: Duration::from_millis((now - created) as u64),
        })
    }

    pub(crate) fn is_rollover_needed(&self, immediate: bool) -> RedoResult<bool> {
        let check = self.rollover_check(immediate).map_err(|e| self.signal(e))?;
        Ok(self.policy.is_rollover_needed(&check, &self.limits))
    }

    pub(crate) fn reset_initial_size(&self) -> RedoResult<()> {
        let size = self.writer.size().map_err(|e| self.signal(e))?;
        self.initial_size.store(size, Ordering::SeqCst);
        Ok(())
    }

    /// Rolls over after a regular append when the size policy says so.
    pub(crate) fn rollover_if_needed(&self) -> RedoResult<()> {
        if self.is_rollover_needed(false)? {
            self.rollover(false, false)?;
        }
        Ok(())
    }

    /// Takes the exclusive lock and rolls over if still needed.
    ///
    /// `force` rolls over any non-empty log. Returns the archive path when
    /// a rollover happened.
    pub(crate) fn rollover(&self, force: bool, skip_checkpoint: bool) -> RedoResult<Option<PathBuf>> {
        let _exclusive = self.lock.write().map_err(|e| self.lock_interrupted(e))?;
        self.rollover_locked(force, skip_checkpoint)
    }

    pub(crate) fn rollover_locked(&self, force: bool, skip_checkpoint: bool) -> RedoResult<Option<PathBuf>> {
        // a racer may have rolled over while we waited
        if !self.is_rollover_needed(force)? {
            return Ok(None);
        }
        let started = Instant::now();

        if self.config.flush_store_on_rollover {
            self.policy.flush_store()?;
        }
        if !skip_checkpoint {
            self.checkpoint_locked()?;
        }

        let carried = self.active.ops();
        let archive = self.writer.rollover(&carried).map_err(|e| self.signal(e))?;
        self.reset_initial_size()?;
        self.metrics.increment_rollovers();

        log_event_with_fields(
            Event::Rollover,
            &[
                ("archive", &archive.display().to_string()),
                ("carried", &carried.len().to_string()),
                ("elapsed_ms", &started.elapsed().as_millis().to_string()),
                ("seq", &self.sequencer.current_sequence().to_string()),
            ],
        );
        Ok(Some(archive))
    }

    /// Writes a Checkpoint of the active table. Caller holds the exclusive
    /// lock. Skipped when no transaction is open.
    pub(crate) fn checkpoint_locked(&self) -> RedoResult<()> {
        let ids = self.active.ids();
        if ids.is_empty() {
            return Ok(());
        }
        let count = ids.len();
        let checkpoint: Arc<dyn RedoableOp> = Arc::new(Checkpoint::new(self.new_txn_id(), ids));
        self.append(&checkpoint, true)?;
        maybe_crash(points::CHECKPOINT_AFTER_WRITE);
        self.metrics.increment_checkpoints();
        log_event_with_fields(
            Event::Checkpoint,
            &[("active", &count.to_string()), ("txn", &checkpoint.txn_id().to_string())],
        );
        Ok(())
    }
}

impl TerminalLog for LogCore {
    fn log_terminal(&self, op: Arc<dyn RedoableOp>, force_sync: bool) -> RedoResult<()> {
        self.log_only(&op, force_sync)
    }
}
