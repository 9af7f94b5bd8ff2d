//! redolog - redo log engine for a mail store
//!
//! Write-ahead logging of mailbox operations with rollover, checkpoints
//! and crash recovery.

pub mod cli;
pub mod config;
pub mod crash_point;
pub mod errors;
pub mod leader;
pub mod manager;
pub mod observability;
pub mod op;
pub mod recovery;
pub mod rollover;
pub mod txn;
pub mod wal;

pub use config::RedoConfig;
pub use errors::{RedoError, RedoErrorKind, RedoResult};
pub use manager::{ChangedMailboxes, RedoLogManager, RedoLogPolicy};
pub use op::{MailboxScope, OpRegistry, OpType, RedoableOp};
pub use txn::{CommitId, TransactionId};
