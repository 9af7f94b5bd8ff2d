//! Turning records back into operations
//!
//! The mailbox layer registers one decoder per op type code. Records with
//! no decoder, or whose decoder fails, become `UndecodableOp`: it keeps
//! the raw record so it can still be carried across a rollover, but its
//! redo always fails so recovery marks it aborted and moves on.

use std::collections::HashMap;
use std::sync::Arc;

use super::{AbortTxn, Checkpoint, CommitTxn, MailboxScope, OpType, RedoableOp};
use crate::errors::{RedoError, RedoResult};
use crate::txn::TransactionId;
use crate::wal::LogRecord;

/// Rebuilds an operation from its record.
pub trait OpDecoder: Send + Sync {
    fn decode(&self, record: &LogRecord) -> RedoResult<Arc<dyn RedoableOp>>;
}

impl<F> OpDecoder for F
where
    F: Fn(&LogRecord) -> RedoResult<Arc<dyn RedoableOp>> + Send + Sync,
{
    fn decode(&self, record: &LogRecord) -> RedoResult<Arc<dyn RedoableOp>> {
        self(record)
    }
}

/// Decoders by op type.
#[derive(Default, Clone)]
pub struct OpRegistry {
    decoders: HashMap<OpType, Arc<dyn OpDecoder>>,
}

impl std::fmt::Debug for OpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.decoders.keys().map(|t| t.code()).collect();
        types.sort_unstable();
        f.debug_struct("OpRegistry").field("types", &types).finish()
    }
}

impl OpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the decoder for `op_type`, replacing any previous one.
    ///
    /// Built-in types cannot be overridden.
    pub fn register(&mut self, op_type: OpType, decoder: impl OpDecoder + 'static) -> RedoResult<()> {
        if op_type.is_builtin() {
            return Err(RedoError::config_invalid(format!(
                "op type {} is reserved",
                op_type
            )));
        }
        self.decoders.insert(op_type, Arc::new(decoder));
        Ok(())
    }

    /// Whether a decoder exists for `op_type`.
    pub fn contains(&self, op_type: OpType) -> bool {
        op_type.is_builtin() || self.decoders.contains_key(&op_type)
    }

    /// Decodes a record. Never fails; see `UndecodableOp`.
    pub fn decode(&self, record: &LogRecord) -> Arc<dyn RedoableOp> {
        let decoded: RedoResult<Arc<dyn RedoableOp>> = match record.op_type {
            OpType::COMMIT_TXN => CommitTxn::from_record(record).map(|op| Arc::new(op) as Arc<dyn RedoableOp>),
            OpType::ABORT_TXN => AbortTxn::from_record(record).map(|op| Arc::new(op) as Arc<dyn RedoableOp>),
            OpType::CHECKPOINT => Checkpoint::from_record(record).map(|op| Arc::new(op) as Arc<dyn RedoableOp>),
            other => match self.decoders.get(&other) {
                Some(decoder) => decoder.decode(record),
                None => Err(RedoError::decode_failed(format!("no decoder registered for {}", other))),
            },
        };
        decoded.unwrap_or_else(|err| Arc::new(UndecodableOp::new(record.clone(), err.to_string())))
    }
}

/// Placeholder for a record that could not be decoded.
#[derive(Debug, Clone)]
pub struct UndecodableOp {
    record: LogRecord,
    reason: String,
}

impl UndecodableOp {
    pub fn new(record: LogRecord, reason: impl Into<String>) -> Self {
        Self {
            record,
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl RedoableOp for UndecodableOp {
    fn op_type(&self) -> OpType {
        self.record.op_type
    }

    fn txn_id(&self) -> TransactionId {
        self.record.txn_id
    }

    fn timestamp(&self) -> i64 {
        self.record.timestamp
    }

    fn mailbox_scope(&self) -> MailboxScope {
        self.record.scope.clone()
    }

    fn is_start_marker(&self) -> bool {
        self.record.is_start_marker()
    }

    fn is_end_marker(&self) -> bool {
        self.record.is_end_marker()
    }

    fn origin_server(&self) -> Option<&str> {
        self.record.origin.as_deref()
    }

    fn payload(&self) -> Vec<u8> {
        self.record.payload.clone()
    }

    fn redo(&self) -> RedoResult<()> {
        let err = RedoError::redo_failed(format!(
            "cannot redo {} for txn {}: {}",
            self.record.op_type, self.record.txn_id, self.reason
        ));
        Err(match self.record.scope.primary_id() {
            Some(id) => err.with_mailbox(id),
            None => err,
        })
    }
}
