//! Changed-mailboxes query
//!
//! Answers "which mailboxes received a committed change after this
//! CommitId" from the retained log history.
//!
//! 1. Under the shared lock: list the archives from the CommitId's
//!    sequence on plus the current file, check the first one's header
//!    sequence, and hard-link them into a scratch directory
//! 2. Without the lock: scan Commit records in order, collecting mailbox
//!    ids once the CommitId's own record has been passed
//!
//! The scratch directory is removed on every exit path.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::state::LogCore;
use crate::errors::{RedoError, RedoResult};
use crate::observability::{log_event_with_fields, Event};
use crate::op::{MailboxId, MailboxScope, OpType};
use crate::txn::CommitId;
use crate::wal::{FileHeader, FileLogReader, LogRecord};

/// Result of a changed-mailboxes query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedMailboxes {
    /// Mailbox ids committed to after the reference point
    pub mailboxes: BTreeSet<MailboxId>,
    /// A commit after the reference point touched every mailbox
    pub includes_all: bool,
    /// Newest commit seen; the reference point itself when nothing followed
    pub last_commit: CommitId,
}

impl ChangedMailboxes {
    fn empty(since: CommitId) -> Self {
        Self {
            mailboxes: BTreeSet::new(),
            includes_all: false,
            last_commit: since,
        }
    }

    fn collect(&mut self, scope: &MailboxScope) {
        match scope {
            MailboxScope::Id(id) if *id > 0 => {
                self.mailboxes.insert(*id);
            }
            MailboxScope::List(ids) => self.mailboxes.extend(ids.iter().copied().filter(|id| *id > 0)),
            MailboxScope::All => self.includes_all = true,
            MailboxScope::Id(_) | MailboxScope::Unresolved => {}
        }
    }
}

/// Scratch directory of hard links, removed on drop
struct ScanDir {
    path: PathBuf,
}

impl ScanDir {
    fn create(parent: &Path) -> RedoResult<Self> {
        let base = format!("tmp-scan-{}", Utc::now().timestamp_millis());
        let mut path = parent.join(&base);
        let mut n = 0;
        loop {
            match fs::create_dir(&path) {
                Ok(()) => return Ok(Self { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    n += 1;
                    path = parent.join(format!("{}-{}", base, n));
                }
                Err(e) => return Err(RedoError::io_at("failed to create scan directory", &path, e)),
            }
        }
    }

    /// Links `source` into the directory; copies when linking is not
    /// possible (archive on another filesystem).
    fn link(&self, index: usize, source: &Path) -> RedoResult<PathBuf> {
        let target = self.path.join(format!("{:06}.log", index));
        if fs::hard_link(source, &target).is_err() {
            fs::copy(source, &target)
                .map_err(|e| RedoError::io_at("failed to link log for scan", source, e))?;
        }
        Ok(target)
    }
}

impl Drop for ScanDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// One file to scan, with the sequence from its header
struct ScanFile {
    path: PathBuf,
    sequence: u64,
}

fn link_files(core: &LogCore, since: &CommitId, scan_dir: &ScanDir) -> RedoResult<Vec<ScanFile>> {
    let _shared = core.shared()?;

    let mut sources: Vec<PathBuf> = core
        .sequencer
        .archived_logs_from_sequence(since.redo_seq())?
        .into_iter()
        .map(|log| log.path)
        .collect();
    sources.push(core.sequencer.log_path().to_path_buf());

    let mut files = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        let header = FileHeader::read_from(source)?;
        if index == 0 && header.sequence != since.redo_seq() {
            return Err(RedoError::invalid_commit_id(since)
                .with_mismatch(since.redo_seq(), header.sequence)
                .with_path(source));
        }
        files.push(ScanFile {
            path: scan_dir.link(index, source)?,
            sequence: header.sequence,
        });
    }
    Ok(files)
}

fn is_commit(record: &LogRecord) -> bool {
    record.op_type == OpType::COMMIT_TXN
}

pub(crate) fn changed_mailboxes_since(core: &LogCore, since: &CommitId) -> RedoResult<ChangedMailboxes> {
    if !core.is_enabled() {
        return Err(RedoError::disabled());
    }
    let scan_dir = ScanDir::create(core.sequencer.log_dir())?;
    let files = link_files(core, since, &scan_dir)?;

    let mut result = ChangedMailboxes::empty(*since);
    let mut found = false;
    for file in &files {
        let mut reader = FileLogReader::open(&file.path, false)?;
        loop {
            let record = match reader.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(err) => {
                    // the live file may end in a record still being written
                    log_event_with_fields(
                        Event::LogTailIgnored,
                        &[("error", &err.to_string()), ("seq", &file.sequence.to_string())],
                    );
                    break;
                }
            };
            if !is_commit(&record) {
                continue;
            }
            if !found {
                found = file.sequence == since.redo_seq() && since.matches(record.txn_id, record.timestamp);
                continue;
            }
            result.collect(&record.scope);
            result.last_commit = CommitId::new(file.sequence, record.timestamp, record.txn_id);
        }
    }

    if !found {
        return Err(RedoError::invalid_commit_id(since));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope_result(scopes: &[MailboxScope]) -> ChangedMailboxes {
        let since = CommitId::new(1, 1, crate::txn::TransactionId::new(1, 1));
        let mut result = ChangedMailboxes::empty(since);
        for scope in scopes {
            result.collect(scope);
        }
        result
    }

    #[test]
    fn test_scopes_expand() {
        let result = scope_result(&[
            MailboxScope::Id(7),
            MailboxScope::List(vec![3, 0, 9]),
            MailboxScope::Unresolved,
            MailboxScope::Id(-1),
        ]);
        assert_eq!(result.mailboxes.into_iter().collect::<Vec<_>>(), vec![3, 7, 9]);
        assert!(!result.includes_all);
    }

    #[test]
    fn test_all_sets_flag() {
        let result = scope_result(&[MailboxScope::All]);
        assert!(result.includes_all);
        assert!(result.mailboxes.is_empty());
    }

    #[test]
    fn test_scan_dir_removed_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = ScanDir::create(dir.path()).unwrap();
        let second = ScanDir::create(dir.path()).unwrap();
        assert_ne!(first.path, second.path);

        let source = dir.path().join("src.log");
        fs::write(&source, b"x").unwrap();
        let linked = first.link(0, &source).unwrap();
        assert_eq!(fs::read(&linked).unwrap(), b"x");

        let path = first.path.clone();
        drop(first);
        assert!(!path.exists());
        assert!(source.exists());
    }
}
