//! Loggable operations
//!
//! The engine treats business operations as opaque: it needs an op type
//! code, a transaction id, start/end-marker flags, a mailbox scope, a
//! timestamp, a payload, and a way to re-execute the operation during
//! recovery. Commit, Abort and Checkpoint records are owned by the engine.

mod markers;
mod registry;

pub use markers::{AbortTxn, Checkpoint, CommitTxn};
pub use registry::{OpDecoder, OpRegistry, UndecodableOp};

use std::fmt;

use crate::errors::RedoResult;
use crate::txn::TransactionId;

/// Mailbox id as used by the mailbox layer
pub type MailboxId = i32;

/// Numeric type code of an operation, stored in every record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpType(u16);

impl OpType {
    /// Checkpoint record written at rollover
    pub const CHECKPOINT: OpType = OpType(1);
    /// Commit record
    pub const COMMIT_TXN: OpType = OpType(2);
    /// Abort record
    pub const ABORT_TXN: OpType = OpType(3);
    /// First code available to business operations
    pub const FIRST_USER_CODE: u16 = 100;

    /// Creates an op type from its code.
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Whether the engine itself owns this type.
    pub fn is_builtin(&self) -> bool {
        matches!(*self, OpType::CHECKPOINT | OpType::COMMIT_TXN | OpType::ABORT_TXN)
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            OpType::CHECKPOINT => write!(f, "Checkpoint"),
            OpType::COMMIT_TXN => write!(f, "CommitTxn"),
            OpType::ABORT_TXN => write!(f, "AbortTxn"),
            OpType(code) => write!(f, "Op#{}", code),
        }
    }
}

/// Which mailboxes an operation touches.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum MailboxScope {
    /// Mailbox not known when the record was written
    #[default]
    Unresolved,
    /// Operation affects every mailbox
    All,
    /// A single mailbox
    Id(MailboxId),
    /// Several mailboxes at once
    List(Vec<MailboxId>),
}

impl MailboxScope {
    /// A single representative id for error context, if any.
    pub fn primary_id(&self) -> Option<MailboxId> {
        match self {
            MailboxScope::Id(id) => Some(*id),
            MailboxScope::List(ids) => ids.first().copied(),
            MailboxScope::Unresolved | MailboxScope::All => None,
        }
    }
}

impl fmt::Display for MailboxScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailboxScope::Unresolved => write!(f, "unresolved"),
            MailboxScope::All => write!(f, "all"),
            MailboxScope::Id(id) => write!(f, "{}", id),
            MailboxScope::List(ids) => {
                let parts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                write!(f, "[{}]", parts.join(","))
            }
        }
    }
}

/// Contract for anything written to the redo log.
///
/// A regular operation is a start marker. Commit and Abort records are end
/// markers. A Checkpoint is neither.
pub trait RedoableOp: fmt::Debug + Send + Sync {
    /// Type code stored with the record.
    fn op_type(&self) -> OpType;

    /// Transaction this record belongs to.
    fn txn_id(&self) -> TransactionId;

    /// Record timestamp in epoch milliseconds.
    fn timestamp(&self) -> i64;

    /// Mailboxes touched.
    fn mailbox_scope(&self) -> MailboxScope {
        MailboxScope::Unresolved
    }

    /// First record of a transaction.
    fn is_start_marker(&self) -> bool {
        true
    }

    /// Commit or Abort record.
    fn is_end_marker(&self) -> bool {
        false
    }

    /// Server the operation originated on.
    fn origin_server(&self) -> Option<&str> {
        None
    }

    /// Opaque serialized body.
    fn payload(&self) -> Vec<u8>;

    /// Re-executes the operation. Only called during recovery.
    fn redo(&self) -> RedoResult<()>;

    /// Whether recovery of this operation must wait until the server has
    /// finished starting up.
    fn defer_crash_recovery(&self) -> bool {
        false
    }
}
