//! Transaction and commit identities
//!
//! - `TransactionId`: `{time, counter}` issued by `TxnIdGenerator`,
//!   totally ordered by time then counter
//! - `CommitId`: durable commit point, `seq-timestamp-time.counter`

mod commit_id;
mod transaction_id;

pub use commit_id::CommitId;
pub use transaction_id::{TransactionId, TxnIdGenerator};
