//! Re-executing uncommitted operations
//!
//! Every operation recovery touches ends up terminated in the log: a
//! Commit record when its redo succeeded, an Abort record when it failed.
//! A transaction left open by a crash is therefore closed exactly once.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use super::player::{RedoPlayer, ScanStats};
use crate::errors::RedoResult;
use crate::observability::{log_event_with_fields, Event, RedoMetrics};
use crate::op::{AbortTxn, CommitTxn, RedoableOp};

/// Where recovery writes its Commit and Abort records.
pub trait TerminalLog {
    fn log_terminal(&self, op: Arc<dyn RedoableOp>, force_sync: bool) -> RedoResult<()>;
}

/// What happened to one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Redo succeeded, Commit logged
    Redone,
    /// Redo failed, Abort logged
    Failed,
    /// Originated on another server, left alone
    Skipped,
}

/// Counts for one recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedoOutcome {
    pub redone: u64,
    pub failed: u64,
    pub skipped: u64,
    /// The pass stopped early on shutdown
    pub cancelled: bool,
}

impl RedoOutcome {
    fn count(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Redone => self.redone += 1,
            Disposition::Failed => self.failed += 1,
            Disposition::Skipped => self.skipped += 1,
        }
    }

    /// Operations this pass terminated
    pub fn terminated(&self) -> u64 {
        self.redone + self.failed
    }
}

/// Result of the pre-startup pass
#[derive(Debug, Default)]
pub struct CrashRecovery {
    pub stats: ScanStats,
    pub outcome: RedoOutcome,
    /// Operations that must wait until startup has finished
    pub deferred: Vec<Arc<dyn RedoableOp>>,
}

impl CrashRecovery {
    /// Uncommitted operations found, deferred ones included
    pub fn recovered(&self) -> u64 {
        self.outcome.redone + self.outcome.failed + self.deferred.len() as u64
    }
}

/// Whether recovery on this server owns `op`
fn owned_here(op: &dyn RedoableOp, origins: &HashSet<String>) -> bool {
    match op.origin_server() {
        Some(origin) => origins.contains(origin),
        None => true,
    }
}

/// Redoes `op` and logs its terminal record.
///
/// A redo failure is not an error here; only a failure to write the
/// terminal record is returned.
pub fn redo_and_terminate(
    op: &Arc<dyn RedoableOp>,
    origins: &HashSet<String>,
    log: &dyn TerminalLog,
    metrics: &RedoMetrics,
) -> RedoResult<Disposition> {
    let txn = op.txn_id().to_string();
    if !owned_here(op.as_ref(), origins) {
        log_event_with_fields(
            Event::RedoSkipped,
            &[
                ("op", &op.op_type().to_string()),
                ("origin", op.origin_server().unwrap_or("")),
                ("txn", &txn),
            ],
        );
        return Ok(Disposition::Skipped);
    }

    match op.redo() {
        Ok(()) => {
            log.log_terminal(Arc::new(CommitTxn::new(op.as_ref())), false)?;
            metrics.increment_ops_redone();
            Ok(Disposition::Redone)
        }
        Err(err) => {
            let mailbox = err
                .context()
                .mailbox_id
                .or_else(|| op.mailbox_scope().primary_id())
                .map(|id| id.to_string())
                .unwrap_or_default();
            log_event_with_fields(
                Event::RedoFailed,
                &[
                    ("error", &err.to_string()),
                    ("mailbox", &mailbox),
                    ("op", &op.op_type().to_string()),
                    ("txn", &txn),
                ],
            );
            log.log_terminal(Arc::new(AbortTxn::new(op.as_ref())), true)?;
            metrics.increment_redo_failures();
            Ok(Disposition::Failed)
        }
    }
}

impl RedoPlayer {
    /// Pre-startup pass over the current log.
    ///
    /// Scans `log_path`, then redoes every uncommitted operation in start
    /// order, except those that ask to wait for startup: they come back in
    /// `deferred` untouched.
    pub fn run_crash_recovery(
        &mut self,
        log_path: &Path,
        origins: &HashSet<String>,
        log: &dyn TerminalLog,
        metrics: &RedoMetrics,
    ) -> RedoResult<CrashRecovery> {
        let mut result = CrashRecovery::default();
        if !log_path.exists() {
            return Ok(result);
        }

        self.scan_file(log_path)?;
        result.stats = self.stats().clone();
        metrics.add_orphans(result.stats.orphans.len() as u64);

        for op in self.uncommitted() {
            if op.defer_crash_recovery() && owned_here(op.as_ref(), origins) {
                result.deferred.push(op);
                continue;
            }
            let disposition = redo_and_terminate(&op, origins, log, metrics)?;
            result.outcome.count(disposition);
        }
        Ok(result)
    }
}

/// Post-startup pass over deferred operations.
///
/// `should_stop` is checked before each operation; once it returns true
/// the remaining operations are left open for the next startup.
pub fn redo_deferred(
    ops: &[Arc<dyn RedoableOp>],
    origins: &HashSet<String>,
    log: &dyn TerminalLog,
    metrics: &RedoMetrics,
    should_stop: impl Fn() -> bool,
) -> RedoResult<RedoOutcome> {
    let mut outcome = RedoOutcome::default();
    for op in ops {
        if should_stop() {
            outcome.cancelled = true;
            break;
        }
        outcome.count(redo_and_terminate(op, origins, log, metrics)?);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RedoError;
    use crate::op::{MailboxScope, OpRegistry, OpType};
    use crate::txn::TransactionId;
    use crate::wal::LogRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Op {
        txn: TransactionId,
        fail: bool,
        defer: bool,
        origin: Option<String>,
        redone: Arc<AtomicUsize>,
    }

    impl Op {
        fn new(counter: i32) -> Self {
            Self {
                txn: TransactionId::new(3, counter),
                fail: false,
                defer: false,
                origin: None,
                redone: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl RedoableOp for Op {
        fn op_type(&self) -> OpType {
            OpType::new(140)
        }
        fn txn_id(&self) -> TransactionId {
            self.txn
        }
        fn timestamp(&self) -> i64 {
            9
        }
        fn mailbox_scope(&self) -> MailboxScope {
            MailboxScope::Id(12)
        }
        fn origin_server(&self) -> Option<&str> {
            self.origin.as_deref()
        }
        fn payload(&self) -> Vec<u8> {
            Vec::new()
        }
        fn redo(&self) -> RedoResult<()> {
            self.redone.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RedoError::redo_failed("mailbox gone"))
            } else {
                Ok(())
            }
        }
        fn defer_crash_recovery(&self) -> bool {
            self.defer
        }
    }

    #[derive(Default)]
    struct Recorded(Mutex<Vec<(OpType, TransactionId, bool)>>);

    impl TerminalLog for Recorded {
        fn log_terminal(&self, op: Arc<dyn RedoableOp>, force_sync: bool) -> RedoResult<()> {
            self.0.lock().unwrap().push((op.op_type(), op.txn_id(), force_sync));
            Ok(())
        }
    }

    fn origins() -> HashSet<String> {
        HashSet::from(["mta1".to_string()])
    }

    #[test]
    fn test_success_commits_failure_aborts() {
        let log = Recorded::default();
        let metrics = RedoMetrics::new();

        let ok: Arc<dyn RedoableOp> = Arc::new(Op::new(1));
        let bad: Arc<dyn RedoableOp> = Arc::new(Op { fail: true, ..Op::new(2) });
        assert_eq!(redo_and_terminate(&ok, &origins(), &log, &metrics).unwrap(), Disposition::Redone);
        assert_eq!(redo_and_terminate(&bad, &origins(), &log, &metrics).unwrap(), Disposition::Failed);

        let entries = log.0.lock().unwrap().clone();
        assert_eq!(entries[0], (OpType::COMMIT_TXN, TransactionId::new(3, 1), false));
        assert_eq!(entries[1], (OpType::ABORT_TXN, TransactionId::new(3, 2), true));
    }

    #[test]
    fn test_foreign_origin_skipped() {
        let log = Recorded::default();
        let op = Op {
            origin: Some("mta9".to_string()),
            ..Op::new(5)
        };
        let redone = Arc::clone(&op.redone);
        let op: Arc<dyn RedoableOp> = Arc::new(op);
        let disposition = redo_and_terminate(&op, &origins(), &log, &RedoMetrics::new()).unwrap();
        assert_eq!(disposition, Disposition::Skipped);
        assert_eq!(redone.load(Ordering::SeqCst), 0);
        assert!(log.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_deferred_pass_stops_on_request() {
        let log = Recorded::default();
        let ops: Vec<Arc<dyn RedoableOp>> = (1..=3).map(|c| Arc::new(Op::new(c)) as Arc<dyn RedoableOp>).collect();
        let calls = AtomicUsize::new(0);
        let outcome = redo_deferred(&ops, &origins(), &log, &RedoMetrics::new(), || {
            calls.fetch_add(1, Ordering::SeqCst) >= 2
        })
        .unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.redone, 2);
        assert_eq!(log.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_crash_recovery_defers_flagged_ops() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("redo.log");

        // both start records decode through the registry
        let mut registry = OpRegistry::new();
        registry
            .register(OpType::new(140), |r: &LogRecord| {
                let op = Op {
                    defer: r.payload == b"defer".to_vec(),
                    ..Op::new(r.txn_id.counter())
                };
                Ok(Arc::new(op) as Arc<dyn RedoableOp>)
            })
            .unwrap();

        let mut now = LogRecord::from_op(&Op::new(1));
        now.payload = b"now".to_vec();
        let mut later = LogRecord::from_op(&Op::new(2));
        later.payload = b"defer".to_vec();
        let mut bytes = crate::wal::FileHeader::new(1, 0).serialize().to_vec();
        bytes.extend(now.serialize());
        bytes.extend(later.serialize());
        std::fs::write(&path, bytes).unwrap();

        let log = Recorded::default();
        let mut player = RedoPlayer::new(Arc::new(registry), true);
        let result = player
            .run_crash_recovery(&path, &origins(), &log, &RedoMetrics::new())
            .unwrap();
        assert_eq!(result.outcome.redone, 1);
        assert_eq!(result.deferred.len(), 1);
        assert_eq!(result.deferred[0].txn_id(), TransactionId::new(3, 2));
        assert_eq!(result.recovered(), 2);
    }

    #[test]
    fn test_missing_log_recovers_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut player = RedoPlayer::new(Arc::new(OpRegistry::new()), true);
        let result = player
            .run_crash_recovery(&dir.path().join("none.log"), &origins(), &Recorded::default(), &RedoMetrics::new())
            .unwrap();
        assert_eq!(result.recovered(), 0);
    }
}
