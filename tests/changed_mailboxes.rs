//! Changed-mailboxes query tests

mod common;

use std::collections::BTreeSet;
use std::fs;

use common::{config, manager, scan_dirs, txn, Journal, TestOp};
use redolog::{CommitId, MailboxScope, RedoLogManager};
use tempfile::TempDir;

fn commit_to(manager: &RedoLogManager, journal: &Journal, scope: MailboxScope) -> CommitId {
    let op = TestOp::new(txn(), 0, journal).with_scope(scope);
    manager.log(op.clone().shared(), false).unwrap();
    manager.commit(&op).unwrap().expect("logging is enabled")
}

fn ids(ids: &[i32]) -> BTreeSet<i32> {
    ids.iter().copied().collect()
}

#[test]
fn test_only_later_commits_reported() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let journal = Journal::default();
    let manager = manager(&dir, &journal);
    manager.start().unwrap();

    commit_to(&manager, &journal, MailboxScope::Id(7));
    let since = commit_to(&manager, &journal, MailboxScope::Id(8));
    let last = commit_to(&manager, &journal, MailboxScope::Id(9));

    let changes = manager.changed_mailboxes_since(&since).unwrap();
    assert_eq!(changes.mailboxes, ids(&[9]));
    assert!(!changes.includes_all);
    assert_eq!(changes.last_commit, last);

    assert!(scan_dirs(config(&dir).log_dir()).is_empty());
    manager.stop().unwrap();
}

#[test]
fn test_nothing_after_reference_point() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let journal = Journal::default();
    let manager = manager(&dir, &journal);
    manager.start().unwrap();

    let since = commit_to(&manager, &journal, MailboxScope::Id(3));
    // uncommitted work does not count
    manager
        .log(TestOp::new(txn(), 4, &journal).shared(), false)
        .unwrap();

    let changes = manager.changed_mailboxes_since(&since).unwrap();
    assert!(changes.mailboxes.is_empty());
    assert_eq!(changes.last_commit, since);
    manager.stop().unwrap();
}

#[test]
fn test_query_spans_rolled_over_files() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let journal = Journal::default();
    let manager = manager(&dir, &journal);
    manager.start().unwrap();

    let since = commit_to(&manager, &journal, MailboxScope::Id(1));
    commit_to(&manager, &journal, MailboxScope::List(vec![2, 3, 0]));
    manager.force_rollover().unwrap();
    commit_to(&manager, &journal, MailboxScope::Unresolved);
    manager.force_rollover().unwrap();
    let last = commit_to(&manager, &journal, MailboxScope::Id(4));

    let changes = manager.changed_mailboxes_since(&since).unwrap();
    assert_eq!(changes.mailboxes, ids(&[2, 3, 4]));
    assert_eq!(changes.last_commit, last);
    assert_eq!(changes.last_commit.redo_seq(), manager.current_log_sequence());
    manager.stop().unwrap();
}

#[test]
fn test_all_mailboxes_flagged() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let journal = Journal::default();
    let manager = manager(&dir, &journal);
    manager.start().unwrap();

    let since = commit_to(&manager, &journal, MailboxScope::Id(1));
    commit_to(&manager, &journal, MailboxScope::All);

    let changes = manager.changed_mailboxes_since(&since).unwrap();
    assert!(changes.includes_all);
    assert!(changes.mailboxes.is_empty());
    manager.stop().unwrap();
}

#[test]
fn test_commit_id_older_than_retained_history() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let journal = Journal::default();
    let manager = manager(&dir, &journal);
    manager.start().unwrap();

    let since = commit_to(&manager, &journal, MailboxScope::Id(1));
    manager.force_rollover().unwrap();
    commit_to(&manager, &journal, MailboxScope::Id(2));
    manager.force_rollover().unwrap();

    // archive cleanup removed the file holding `since`
    let oldest = manager
        .archived_logs_from_sequence(since.redo_seq())
        .unwrap()
        .remove(0);
    assert_eq!(oldest.sequence, since.redo_seq());
    fs::remove_file(&oldest.path).unwrap();

    let err = manager.changed_mailboxes_since(&since).unwrap_err();
    assert_eq!(err.code(), "REDO_INVALID_COMMIT_ID");
    assert!(scan_dirs(config(&dir).log_dir()).is_empty());
    manager.stop().unwrap();
}

#[test]
fn test_unknown_commit_rejected() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let journal = Journal::default();
    let manager = manager(&dir, &journal);
    manager.start().unwrap();

    let real = commit_to(&manager, &journal, MailboxScope::Id(1));
    let forged = CommitId::new(real.redo_seq(), real.txn_timestamp(), txn());

    let err = manager.changed_mailboxes_since(&forged).unwrap_err();
    assert_eq!(err.code(), "REDO_INVALID_COMMIT_ID");
    manager.stop().unwrap();
}

#[test]
fn test_query_works_offline() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let journal = Journal::default();
    let (since, last) = {
        let manager = manager(&dir, &journal);
        manager.start().unwrap();
        let since = commit_to(&manager, &journal, MailboxScope::Id(5));
        let last = commit_to(&manager, &journal, MailboxScope::Id(6));
        manager.stop().unwrap();
        (since, last)
    };

    // never started: reads the archives on disk
    let offline = manager(&dir, &journal);
    let changes = offline.changed_mailboxes_since(&since).unwrap();
    assert_eq!(changes.mailboxes, ids(&[6]));
    assert_eq!(changes.last_commit, last);
}
