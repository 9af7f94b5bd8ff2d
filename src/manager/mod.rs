//! Redo log manager
//!
//! Owns the current log file, the active transaction table and the
//! rollover policy, and runs crash recovery at startup.
//!
//! # Lifecycle
//!
//! 1. `new()` wires config, policy and op decoders; nothing touches disk
//! 2. `start()` repairs an interrupted rollover, opens the log, redoes
//!    uncommitted operations and spawns deferred recovery
//! 3. `log()` / `commit()` / `abort()` from any number of threads
//! 4. `stop()` waits for deferred recovery, rolls over and closes
//!
//! # Locking
//!
//! - Appends hold the log lock shared, rollover and checkpoint exclusive
//! - The active table has its own mutex
//! - A caller blocked on the lock when `stop()` begins gets
//!   `REDO_LOCK_INTERRUPTED`

mod active;
mod changes;
mod deferred;
mod lock;
mod policy;
mod state;

pub use active::ActiveOps;
pub use changes::ChangedMailboxes;
pub use lock::{LogLock, ReadGuard, WriteGuard};
pub use policy::{
    default_rollover_needed, report_log_error, DefaultPolicy, RedoLogPolicy, RolloverCheck, RolloverLimits,
};

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use self::state::LogCore;
use crate::config::RedoConfig;
use crate::crash_point::{maybe_crash, points};
use crate::errors::{RedoError, RedoResult};
use crate::leader::LeaderAwarePolicy;
use crate::observability::{log_event, log_event_with_fields, Event, MetricsSnapshot};
use crate::op::{AbortTxn, CommitTxn, OpRegistry, RedoableOp};
use crate::recovery::{CrashRecovery, RedoPlayer};
use crate::rollover::{ArchivedLog, RolloverManager};
use crate::txn::{CommitId, TransactionId};

/// Picks the policy the configuration asks for.
pub fn policy_from_config(config: &RedoConfig) -> Arc<dyn RedoLogPolicy> {
    match &config.leader {
        Some(_) => Arc::new(LeaderAwarePolicy::from_config(config)),
        None => Arc::new(DefaultPolicy::from_config(config)),
    }
}

/// Sets a flag until dropped, then restores its previous value.
struct FlagGuard<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        let previous = flag.swap(true, Ordering::SeqCst);
        Self { flag, previous }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

/// The redo log of one server.
pub struct RedoLogManager {
    core: Arc<LogCore>,
    running: AtomicBool,
    deferred: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RedoLogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedoLogManager")
            .field("log_path", &self.core.config.log_path)
            .field("enabled", &self.core.is_enabled())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl RedoLogManager {
    pub fn new(config: RedoConfig, policy: Arc<dyn RedoLogPolicy>, registry: OpRegistry) -> Self {
        Self {
            core: Arc::new(LogCore::new(config, policy, registry)),
            running: AtomicBool::new(false),
            deferred: Mutex::new(None),
        }
    }

    /// Manager with the policy selected by `config`.
    pub fn from_config(config: RedoConfig, registry: OpRegistry) -> Self {
        let policy = policy_from_config(&config);
        Self::new(config, policy, registry)
    }

    pub fn start(&self) -> RedoResult<()> {
        let core = &self.core;
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        let started = Instant::now();
        log_event_with_fields(
            Event::StartupBegin,
            &[("path", &core.config.log_path.display().to_string())],
        );
        if !core.is_enabled() {
            log_event(Event::LoggingDisabled);
            return Ok(());
        }

        for dir in [core.config.log_dir(), core.config.archive_dir.as_path()] {
            fs::create_dir_all(dir)
                .map_err(|e| core.signal(RedoError::io_at("failed to create log directory", dir, e)))?;
        }
        core.shutting_down.store(false, Ordering::SeqCst);
        core.cancel_deferred.store(false, Ordering::SeqCst);
        core.sequencer.crash_recovery().map_err(|e| core.signal(e))?;

        core.writer.open().map_err(|e| core.signal(e))?;
        core.sequencer
            .init_sequence(core.writer.sequence().map_err(|e| core.signal(e))?);

        let in_crash_recovery = FlagGuard::raise(&core.in_crash_recovery);
        let recovered = if core.config.supports_crash_recovery {
            // redo re-executes ops that log through this manager
            let recovery_mode = FlagGuard::raise(&core.recovery_mode);
            let recovered = self.recover();
            drop(recovery_mode);
            let recovered = recovered?;
            // reopen for ongoing writes
            core.writer.close().map_err(|e| core.signal(e))?;
            core.writer.open().map_err(|e| core.signal(e))?;
            core.sequencer
                .init_sequence(core.writer.sequence().map_err(|e| core.signal(e))?);
            recovered
        } else {
            CrashRecovery::default()
        };
        core.reset_initial_size()?;
        self.running.store(true, Ordering::SeqCst);

        if recovered.recovered() > 0 {
            for op in &recovered.deferred {
                core.active.put(Arc::clone(op));
            }
            maybe_crash(points::RECOVERY_BEFORE_ROLLOVER);
            core.rollover(true, false)?;
            if !recovered.deferred.is_empty() {
                let handle = deferred::spawn(Arc::clone(core), recovered.deferred)?;
                *self.deferred_slot() = Some(handle);
            }
        }
        drop(in_crash_recovery);

        log_event_with_fields(
            Event::StartupComplete,
            &[
                ("elapsed_ms", &started.elapsed().as_millis().to_string()),
                ("seq", &core.sequencer.current_sequence().to_string()),
            ],
        );
        Ok(())
    }

    /// Pre-startup pass over the current log.
    fn recover(&self) -> RedoResult<CrashRecovery> {
        let core = &self.core;
        log_event(Event::RecoveryBegin);
        // the writer cut any damaged tail when it opened the file
        let mut player = RedoPlayer::new(Arc::clone(&core.registry), false);
        let recovered = player.run_crash_recovery(
            core.sequencer.log_path(),
            &core.config.recovery_origins(),
            core.as_ref(),
            &core.metrics,
        )?;
        log_event_with_fields(
            Event::RecoveryComplete,
            &[
                ("checkpoint_mismatches", &recovered.stats.checkpoint_mismatches.to_string()),
                ("deferred", &recovered.deferred.len().to_string()),
                ("failed", &recovered.outcome.failed.to_string()),
                ("orphans", &recovered.stats.orphans.len().to_string()),
                ("records", &recovered.stats.records.to_string()),
                ("redone", &recovered.outcome.redone.to_string()),
                ("skipped", &recovered.outcome.skipped.to_string()),
            ],
        );
        Ok(recovered)
    }

    fn ensure_running(&self) -> RedoResult<()> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RedoError::service_unavailable("redo log is not running"))
        }
    }

    fn deferred_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops the manager. Blocks until deferred recovery has finished or
    /// acknowledged cancellation.
    pub fn stop(&self) -> RedoResult<()> {
        let core = &self.core;
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        log_event(Event::ShutdownBegin);

        core.cancel_deferred.store(true, Ordering::SeqCst);
        let handle = self.deferred_slot().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log_event_with_fields(Event::LogError, &[("error", "post-startup recovery panicked")]);
            }
        }

        core.shutting_down.store(true, Ordering::SeqCst);
        core.lock.interrupt();

        let rolled = core.rollover(true, false);
        let flushed = core.writer.flush().map_err(|e| core.signal(e));
        let closed = core.writer.close().map_err(|e| core.signal(e));

        log_event_with_fields(
            Event::ShutdownComplete,
            &[
                ("logged", &core.metrics.records_logged().to_string()),
                ("ms_per_item", &format!("{:.3}", core.metrics.avg_logging_millis())),
            ],
        );
        rolled?;
        flushed?;
        closed
    }

    /// Logs `op`, then rolls over if the size policy says so.
    ///
    /// No-op when logging is disabled or the manager is in recovery mode.
    pub fn log(&self, op: Arc<dyn RedoableOp>, synchronous: bool) -> RedoResult<()> {
        if !self.is_enabled() || self.core.recovery_mode.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.ensure_running()?;
        self.core.log_only(&op, synchronous)?;
        self.core.rollover_if_needed()
    }

    /// Logs `op` without the rollover check.
    pub fn log_only(&self, op: Arc<dyn RedoableOp>, synchronous: bool) -> RedoResult<()> {
        if !self.is_enabled() || self.core.recovery_mode.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.ensure_running()?;
        self.core.log_only(&op, synchronous)
    }

    /// Logs a Commit for `op` without fsync. Returns the commit point, or
    /// `None` when nothing was logged.
    pub fn commit(&self, op: &dyn RedoableOp) -> RedoResult<Option<CommitId>> {
        if !self.is_enabled() || self.core.recovery_mode.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.ensure_running()?;
        let commit = CommitTxn::new(op);
        let (txn_id, timestamp) = (commit.txn_id(), commit.timestamp());
        let record: Arc<dyn RedoableOp> = Arc::new(commit);
        let seq = self.core.log_in_sequence(&record, false)?;
        self.core.rollover_if_needed()?;
        Ok(Some(CommitId::new(seq, timestamp, txn_id)))
    }

    /// Logs an Abort for `op` and fsyncs before returning.
    pub fn abort(&self, op: &dyn RedoableOp) -> RedoResult<()> {
        self.log(Arc::new(AbortTxn::new(op)), true)
    }

    pub fn flush(&self) -> RedoResult<()> {
        if !self.is_enabled() || !self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.core.writer.flush().map_err(|e| self.core.signal(e))
    }

    /// Rolls over any non-empty log. Returns the archive path.
    pub fn force_rollover(&self) -> RedoResult<Option<PathBuf>> {
        self.force_rollover_with(false)
    }

    pub fn force_rollover_skip_checkpoint(&self) -> RedoResult<Option<PathBuf>> {
        self.force_rollover_with(true)
    }

    fn force_rollover_with(&self, skip_checkpoint: bool) -> RedoResult<Option<PathBuf>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        self.ensure_running()?;
        self.core.rollover(true, skip_checkpoint)
    }

    /// Writes a Checkpoint of the active table under the exclusive lock.
    pub fn checkpoint(&self) -> RedoResult<()> {
        self.acquire_exclusive_lock()?.checkpoint()
    }

    /// Next transaction id. Issued even when logging is disabled.
    pub fn new_txn_id(&self) -> TransactionId {
        self.core.new_txn_id()
    }

    /// Mailboxes committed to after `since`.
    ///
    /// Fails with `REDO_INVALID_COMMIT_ID` when `since` is older than the
    /// retained archives or its commit record cannot be found.
    pub fn changed_mailboxes_since(&self, since: &CommitId) -> RedoResult<ChangedMailboxes> {
        changes::changed_mailboxes_since(&self.core, since)
    }

    pub fn archived_logs(&self) -> RedoResult<Vec<ArchivedLog>> {
        self.core.sequencer.archived_logs()
    }

    pub fn archived_logs_from_sequence(&self, seq: u64) -> RedoResult<Vec<ArchivedLog>> {
        self.core.sequencer.archived_logs_from_sequence(seq)
    }

    pub fn current_log_sequence(&self) -> u64 {
        self.core.sequencer.current_sequence()
    }

    /// True while `start()` is redoing uncommitted operations.
    pub fn in_crash_recovery(&self) -> bool {
        self.core.in_crash_recovery.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    /// In recovery mode `log()` and `commit()` write nothing.
    pub fn set_recovery_mode(&self, on: bool) {
        self.core.recovery_mode.store(on, Ordering::SeqCst);
    }

    /// Open transactions in start order.
    pub fn active_txn_ids(&self) -> Vec<TransactionId> {
        self.core.active.ids()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    pub fn rollover_manager(&self) -> &Arc<RolloverManager> {
        &self.core.sequencer
    }

    /// Quiesces the log: no append or rollover runs until the guard drops.
    pub fn acquire_exclusive_lock(&self) -> RedoResult<ExclusiveLock<'_>> {
        let guard = self.core.lock.write().map_err(|e| self.core.lock_interrupted(e))?;
        Ok(ExclusiveLock {
            core: &self.core,
            _guard: guard,
        })
    }
}

impl Drop for RedoLogManager {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            let _ = self.stop();
        }
    }
}

/// Exclusive hold on the log, from `acquire_exclusive_lock`
pub struct ExclusiveLock<'a> {
    core: &'a LogCore,
    _guard: WriteGuard<'a>,
}

impl ExclusiveLock<'_> {
    /// Writes a Checkpoint of the active table.
    pub fn checkpoint(&self) -> RedoResult<()> {
        if !self.core.is_enabled() {
            return Ok(());
        }
        self.core.checkpoint_locked()
    }

    /// Open transactions; stable while the lock is held.
    pub fn active_txn_ids(&self) -> Vec<TransactionId> {
        self.core.active.ids()
    }
}
