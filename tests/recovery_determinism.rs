//! Redo player determinism tests
//!
//! The same log always yields the same open-transaction set and the same
//! scan statistics, however often it is read.

mod common;

use std::sync::Arc;

use common::{registry, txn, write_log, Journal, TestOp};
use redolog::op::{Checkpoint, CommitTxn};
use redolog::recovery::RedoPlayer;
use redolog::wal::LogRecord;
use redolog::TransactionId;
use tempfile::TempDir;

fn scan(journal: &Journal, paths: &[&std::path::Path]) -> RedoPlayer {
    let mut player = RedoPlayer::new(Arc::new(registry(journal)), false);
    for path in paths {
        player.scan_file(path).expect("scan failed");
    }
    player
}

fn open_ids(player: &RedoPlayer) -> Vec<TransactionId> {
    player.uncommitted().iter().map(|op| op.txn_id()).collect()
}

#[test]
fn test_same_log_same_result() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let journal = Journal::default();
    let ops: Vec<TestOp> = (0..6).map(|i| TestOp::new(txn(), i, &journal)).collect();
    let mut records: Vec<LogRecord> = ops.iter().map(|op| op.record()).collect();
    records.push(LogRecord::from_op(&CommitTxn::new(&ops[1])));
    records.push(LogRecord::from_op(&CommitTxn::new(&ops[4])));
    let path = dir.path().join("redo.log");
    write_log(&path, 3, &records, &[]);

    let first = scan(&journal, &[&path]);
    let second = scan(&journal, &[&path]);

    assert_eq!(open_ids(&first), open_ids(&second));
    assert_eq!(first.stats(), second.stats());
    assert_eq!(
        open_ids(&first),
        vec![ops[0].txn_id, ops[2].txn_id, ops[3].txn_id, ops[5].txn_id]
    );
    assert_eq!(first.stats().records, 8);
    // scanning never redoes anything
    assert!(journal.redone().is_empty());
}

#[test]
fn test_transaction_spanning_files() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let journal = Journal::default();
    let spanning = TestOp::new(txn(), 1, &journal);
    let later = TestOp::new(txn(), 2, &journal);

    let archive = dir.path().join("archive.log");
    let current = dir.path().join("redo.log");
    write_log(&archive, 1, &[spanning.record()], &[]);
    write_log(
        &current,
        2,
        &[later.record(), LogRecord::from_op(&CommitTxn::new(&spanning))],
        &[],
    );

    let player = scan(&journal, &[&archive, &current]);
    assert_eq!(open_ids(&player), vec![later.txn_id]);
    assert_eq!(player.stats().files, 2);
    assert!(player.stats().orphans.is_empty());
}

#[test]
fn test_checkpoint_disagreement_reported_not_fatal() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let journal = Journal::default();
    let open = TestOp::new(txn(), 1, &journal);
    let path = dir.path().join("redo.log");
    // the checkpoint names a transaction the log never started
    let checkpoint = Checkpoint::new(txn(), vec![open.txn_id, txn()]);
    write_log(&path, 1, &[open.record(), LogRecord::from_op(&checkpoint)], &[]);

    let player = scan(&journal, &[&path]);
    assert_eq!(player.stats().checkpoint_mismatches, 1);
    assert_eq!(open_ids(&player), vec![open.txn_id]);
}

#[test]
fn test_damaged_tail_ignored_by_read_only_scan() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let journal = Journal::default();
    let open = TestOp::new(txn(), 1, &journal);
    let path = dir.path().join("redo.log");
    write_log(&path, 1, &[open.record()], &[9, 9, 9]);
    let size = std::fs::metadata(&path).unwrap().len();

    let player = scan(&journal, &[&path]);
    assert_eq!(open_ids(&player), vec![open.txn_id]);
    assert_eq!(player.stats().ignored_tails, 1);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), size);
}
