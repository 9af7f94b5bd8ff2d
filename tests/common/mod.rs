//! Shared test doubles for the integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use redolog::manager::DefaultPolicy;
use redolog::op::{MailboxScope, OpRegistry, OpType, RedoableOp};
use redolog::wal::{FileHeader, FileLogReader, LogRecord};
use redolog::{RedoConfig, RedoLogManager, RedoResult, TransactionId};
use tempfile::TempDir;

pub const TEST_OP: OpType = OpType::new(120);

/// Records which transactions were redone, in order
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<TransactionId>>>);

impl Journal {
    pub fn redone(&self) -> Vec<TransactionId> {
        self.0.lock().unwrap().clone()
    }

    pub fn push(&self, txn_id: TransactionId) {
        self.0.lock().unwrap().push(txn_id);
    }
}

/// In-memory mailbox operation
#[derive(Debug, Clone)]
pub struct TestOp {
    pub txn_id: TransactionId,
    pub timestamp: i64,
    pub scope: MailboxScope,
    pub origin: Option<String>,
    pub fail: bool,
    pub defer: bool,
    pub delay_ms: u32,
    journal: Journal,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Journal").field(&self.redone().len()).finish()
    }
}

static COUNTER: AtomicI32 = AtomicI32::new(1);

/// Transaction id unique within the test binary
pub fn txn() -> TransactionId {
    TransactionId::new(1_000, COUNTER.fetch_add(1, Ordering::SeqCst))
}

impl TestOp {
    pub fn new(txn_id: TransactionId, mailbox: i32, journal: &Journal) -> Self {
        Self {
            txn_id,
            timestamp: 1_700_000_000_000,
            scope: MailboxScope::Id(mailbox),
            origin: None,
            fail: false,
            defer: false,
            delay_ms: 0,
            journal: journal.clone(),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn deferred(mut self) -> Self {
        self.defer = true;
        self
    }

    pub fn slow(mut self, delay_ms: u32) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn from_origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    pub fn with_scope(mut self, scope: MailboxScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn shared(self) -> Arc<dyn RedoableOp> {
        Arc::new(self)
    }

    pub fn record(&self) -> LogRecord {
        LogRecord::from_op(self)
    }

    fn decode(record: &LogRecord, journal: &Journal) -> RedoResult<Arc<dyn RedoableOp>> {
        let payload = &record.payload;
        if payload.len() != 6 {
            return Err(redolog::RedoError::decode_failed("test op payload must be 6 bytes"));
        }
        let op = TestOp {
            txn_id: record.txn_id,
            timestamp: record.timestamp,
            scope: record.scope.clone(),
            origin: record.origin.clone(),
            fail: payload[0] == 1,
            defer: payload[1] == 1,
            delay_ms: u32::from_le_bytes([payload[2], payload[3], payload[4], payload[5]]),
            journal: journal.clone(),
        };
        Ok(Arc::new(op))
    }
}

impl RedoableOp for TestOp {
    fn op_type(&self) -> OpType {
        TEST_OP
    }

    fn txn_id(&self) -> TransactionId {
        self.txn_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn mailbox_scope(&self) -> MailboxScope {
        self.scope.clone()
    }

    fn origin_server(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    fn payload(&self) -> Vec<u8> {
        let mut payload = vec![self.fail as u8, self.defer as u8];
        payload.extend_from_slice(&self.delay_ms.to_le_bytes());
        payload
    }

    fn redo(&self) -> RedoResult<()> {
        if self.delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.delay_ms as u64));
        }
        if self.fail {
            return Err(redolog::RedoError::redo_failed("mailbox store refused the change"));
        }
        self.journal.push(self.txn_id);
        Ok(())
    }

    fn defer_crash_recovery(&self) -> bool {
        self.defer
    }
}

pub fn registry(journal: &Journal) -> OpRegistry {
    let journal = journal.clone();
    let mut registry = OpRegistry::new();
    registry
        .register(TEST_OP, move |record: &LogRecord| TestOp::decode(record, &journal))
        .unwrap();
    registry
}

pub fn config(dir: &TempDir) -> RedoConfig {
    config_in(dir.path())
}

pub fn config_in(dir: &Path) -> RedoConfig {
    let mut config = RedoConfig::new(dir.join("redo").join("redo.log"), dir.join("redo").join("archive"));
    config.fsync_interval_ms = 0;
    config.halt_on_fatal = false;
    config.server_id = "mta1".to_string();
    config
}

pub fn manager_with(config: RedoConfig, journal: &Journal) -> RedoLogManager {
    let policy = Arc::new(DefaultPolicy::from_config(&config));
    RedoLogManager::new(config, policy, registry(journal))
}

pub fn manager(dir: &TempDir, journal: &Journal) -> RedoLogManager {
    manager_with(config(dir), journal)
}

pub fn manager_in(dir: &Path, journal: &Journal) -> RedoLogManager {
    manager_with(config_in(dir), journal)
}

/// Writes a log file by hand: header then records.
pub fn write_log(path: &Path, seq: u64, records: &[LogRecord], tail: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut bytes = FileHeader::new(seq, 1_700_000_000_000).serialize().to_vec();
    for record in records {
        bytes.extend(record.serialize());
    }
    bytes.extend_from_slice(tail);
    fs::write(path, bytes).unwrap();
}

pub fn read_records(path: &Path) -> Vec<LogRecord> {
    let mut reader = FileLogReader::open(path, false).unwrap();
    let (records, _) = reader.read_all();
    records
}

/// Every record in every archive, oldest archive first
pub fn archived_records(manager: &RedoLogManager) -> Vec<LogRecord> {
    manager
        .archived_logs()
        .unwrap()
        .iter()
        .flat_map(|log| read_records(&log.path))
        .collect()
}

pub fn scan_dirs(log_dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(log_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with("tmp-scan-"))
                .unwrap_or(false)
        })
        .collect()
}
