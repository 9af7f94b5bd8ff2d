//! Engine-owned records: CommitTxn, AbortTxn, Checkpoint

use chrono::Utc;

use super::{MailboxScope, OpType, RedoableOp};
use crate::errors::{RedoError, RedoResult};
use crate::txn::TransactionId;
use crate::wal::LogRecord;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn decode_txn_type(record: &LogRecord) -> RedoResult<OpType> {
    if record.payload.len() < 2 {
        return Err(RedoError::decode_failed(format!(
            "{} record for txn {} has no transaction type",
            record.op_type, record.txn_id
        )));
    }
    Ok(OpType::new(u16::from_le_bytes([record.payload[0], record.payload[1]])))
}

macro_rules! end_marker {
    ($name:ident, $code:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            txn_id: TransactionId,
            timestamp: i64,
            scope: MailboxScope,
            txn_type: OpType,
        }

        impl $name {
            /// Terminates the transaction `op` belongs to.
            pub fn new(op: &dyn RedoableOp) -> Self {
                Self {
                    txn_id: op.txn_id(),
                    timestamp: now_millis(),
                    scope: op.mailbox_scope(),
                    txn_type: op.op_type(),
                }
            }

            /// Rebuilds the marker from a decoded record.
            pub fn from_record(record: &LogRecord) -> RedoResult<Self> {
                Ok(Self {
                    txn_id: record.txn_id,
                    timestamp: record.timestamp,
                    scope: record.scope.clone(),
                    txn_type: decode_txn_type(record)?,
                })
            }

            /// Type of the operation this record terminates.
            pub fn txn_type(&self) -> OpType {
                self.txn_type
            }
        }

        impl RedoableOp for $name {
            fn op_type(&self) -> OpType {
                $code
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

            fn is_start_marker(&self) -> bool {
                false
            }

            fn is_end_marker(&self) -> bool {
                true
            }

            fn payload(&self) -> Vec<u8> {
                self.txn_type.code().to_le_bytes().to_vec()
            }

            fn redo(&self) -> RedoResult<()> {
                Ok(())
            }
        }
    };
}

end_marker!(CommitTxn, OpType::COMMIT_TXN, "Commit record. Logged without a forced fsync.");
end_marker!(AbortTxn, OpType::ABORT_TXN, "Abort record. Always logged with a forced fsync.");

/// Snapshot of the transactions active when a rollover happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    txn_id: TransactionId,
    timestamp: i64,
    active: Vec<TransactionId>,
}

impl Checkpoint {
    /// Creates a checkpoint over `active`, kept in table order.
    pub fn new(txn_id: TransactionId, active: Vec<TransactionId>) -> Self {
        Self {
            txn_id,
            timestamp: now_millis(),
            active,
        }
    }

    /// Rebuilds a checkpoint from a decoded record.
    pub fn from_record(record: &LogRecord) -> RedoResult<Self> {
        let data = &record.payload;
        if data.len() < 4 {
            return Err(RedoError::decode_failed("checkpoint record too short"));
        }
        let count = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() != 4 + count * 8 {
            return Err(RedoError::decode_failed("checkpoint record length mismatch")
                .with_mismatch(4 + count * 8, data.len()));
        }
        let active = data[4..]
            .chunks_exact(8)
            .map(|chunk| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(chunk);
                TransactionId::from_bytes(bytes)
            })
            .collect();
        Ok(Self {
            txn_id: record.txn_id,
            timestamp: record.timestamp,
            active,
        })
    }

    /// Transactions active at checkpoint time, in table order.
    pub fn active_txns(&self) -> &[TransactionId] {
        &self.active
    }
}

impl RedoableOp for Checkpoint {
    fn op_type(&self) -> OpType {
        OpType::CHECKPOINT
    }

    fn txn_id(&self) -> TransactionId {
        self.txn_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn mailbox_scope(&self) -> MailboxScope {
        MailboxScope::All
    }

    fn is_start_marker(&self) -> bool {
        false
    }

    fn payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.active.len() * 8);
        buf.extend_from_slice(&(self.active.len() as u32).to_le_bytes());
        for id in &self.active {
            buf.extend_from_slice(&id.to_bytes());
        }
        buf
    }

    fn redo(&self) -> RedoResult<()> {
        Ok(())
    }
}
