//! Writer that refuses to touch the log without leadership

use std::path::PathBuf;
use std::sync::Arc;

use super::LeaderState;
use crate::errors::{RedoError, RedoResult};
use crate::op::RedoableOp;
use crate::wal::{LogRecord, LogWriter};

/// Wraps a `LogWriter`; appends and rollovers fail with
/// `REDO_LEADER_UNAVAILABLE` while this node is not the leader.
pub struct LeaderGuardedWriter {
    inner: Arc<dyn LogWriter>,
    state: Arc<LeaderState>,
}

impl LeaderGuardedWriter {
    pub fn new(inner: Arc<dyn LogWriter>, state: Arc<LeaderState>) -> Self {
        Self { inner, state }
    }

    fn check_leader(&self, action: &str) -> RedoResult<()> {
        if self.state.is_leader() {
            Ok(())
        } else {
            Err(RedoError::leader_unavailable(format!(
                "cannot {} redo log: not the leader",
                action
            )))
        }
    }
}

impl LogWriter for LeaderGuardedWriter {
    fn open(&self) -> RedoResult<()> {
        self.check_leader("open")?;
        self.inner.open()
    }

    fn close(&self) -> RedoResult<()> {
        self.inner.close()
    }

    fn log(&self, record: &LogRecord, force_sync: bool) -> RedoResult<u64> {
        self.check_leader("append to")?;
        self.inner.log(record, force_sync)
    }

    fn flush(&self) -> RedoResult<()> {
        self.inner.flush()
    }

    fn is_empty(&self) -> RedoResult<bool> {
        self.inner.is_empty()
    }

    fn size(&self) -> RedoResult<u64> {
        self.inner.size()
    }

    fn create_time(&self) -> RedoResult<i64> {
        self.inner.create_time()
    }

    fn sequence(&self) -> RedoResult<u64> {
        self.inner.sequence()
    }

    fn rollover(&self, active: &[Arc<dyn RedoableOp>]) -> RedoResult<PathBuf> {
        self.check_leader("roll over")?;
        self.inner.rollover(active)
    }
}
