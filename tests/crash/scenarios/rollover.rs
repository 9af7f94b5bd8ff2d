//! Rollover crash scenarios
//!
//! The child commits one transaction, leaves a second one open and forces
//! a rollover. Whichever step the crash interrupts, the next start must
//! find exactly the open transaction and redo it once.

use redolog::crash_point::points;
use redolog::TransactionId;
use tempfile::TempDir;

use crate::common::{config, manager, manager_in, Journal, TestOp};
use crate::crash::harness::{assert_crashed, child_dir, pending_temp_files, run_with_crash_point};

const CHILD: &str = "crash::scenarios::rollover::child_rollover_workload";

const COMMITTED: TransactionId = TransactionId::new(77, 1);
const OPEN: TransactionId = TransactionId::new(77, 2);

#[test]
fn child_rollover_workload() {
    let Some(dir) = child_dir() else {
        return;
    };
    let journal = Journal::default();
    let manager = manager_in(&dir, &journal);
    manager.start().unwrap();

    let committed = TestOp::new(COMMITTED, 1, &journal);
    manager.log(committed.clone().shared(), false).unwrap();
    manager.commit(&committed).unwrap();
    manager.log(TestOp::new(OPEN, 2, &journal).shared(), true).unwrap();

    manager.force_rollover().unwrap();
}

fn crash_during_rollover(crash_point: &str) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let result = run_with_crash_point(CHILD, crash_point, dir.path());
    assert_crashed(crash_point, &result);

    let journal = Journal::default();
    let manager = manager(&dir, &journal);
    manager.start().unwrap();

    assert_eq!(journal.redone(), vec![OPEN]);
    assert!(manager.active_txn_ids().is_empty());
    assert!(config(&dir).log_path.exists());
    assert!(pending_temp_files(config(&dir).log_dir()).is_empty());
    manager.stop().unwrap();
}

/// Test: temp file written, current log untouched
#[test]
fn test_crash_after_temp_written() {
    crash_during_rollover(points::ROLLOVER_AFTER_TEMP);
}

/// Test: current log archived, temp not yet in place
#[test]
fn test_crash_after_archive() {
    crash_during_rollover(points::ROLLOVER_AFTER_ARCHIVE);
}

/// Test: temp renamed into place
#[test]
fn test_crash_after_rename() {
    crash_during_rollover(points::ROLLOVER_AFTER_RENAME);
}

/// Test: checkpoint appended, rollover not started
#[test]
fn test_crash_after_checkpoint() {
    crash_during_rollover(points::CHECKPOINT_AFTER_WRITE);
}
