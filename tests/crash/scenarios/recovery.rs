//! Recovery crash scenarios
//!
//! A crash after startup recovery has redone and committed an operation,
//! but before the recovered log is rolled over, must not cause a second
//! redo on the next start.

use redolog::crash_point::points;
use redolog::op::OpType;
use redolog::TransactionId;
use tempfile::TempDir;

use crate::common::{config, config_in, manager, manager_in, read_records, write_log, Journal, TestOp};
use crate::crash::harness::{assert_crashed, child_dir, run_with_crash_point};

const CHILD: &str = "crash::scenarios::recovery::child_recovery_workload";

const OPEN: TransactionId = TransactionId::new(88, 1);

#[test]
fn child_recovery_workload() {
    let Some(dir) = child_dir() else {
        return;
    };
    let journal = Journal::default();
    let open = TestOp::new(OPEN, 5, &journal);
    write_log(&config_in(&dir).log_path, 1, &[open.record()], &[]);

    let manager = manager_in(&dir, &journal);
    manager.start().unwrap();
}

/// Test: redo committed, log not yet rolled over
#[test]
fn test_crash_before_recovery_rollover() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let result = run_with_crash_point(CHILD, points::RECOVERY_BEFORE_ROLLOVER, dir.path());
    assert_crashed(points::RECOVERY_BEFORE_ROLLOVER, &result);

    let journal = Journal::default();
    let manager = manager(&dir, &journal);
    manager.start().unwrap();
    assert!(journal.redone().is_empty());

    let commits = read_records(&config(&dir).log_path)
        .iter()
        .filter(|r| r.op_type == OpType::COMMIT_TXN && r.txn_id == OPEN)
        .count();
    assert_eq!(commits, 1);
    manager.stop().unwrap();
}
