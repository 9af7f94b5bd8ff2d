//! CommitId - a durable point in redo log history
//!
//! A CommitId names the log file that holds a commit record (by its
//! sequence) plus the commit's timestamp and transaction id. Replayed
//! transactions may produce several commit records with the same
//! TransactionId, so the timestamp is needed to pick the exact one.
//!
//! External form: `<seq>-<timestamp>-<time>.<counter>`

use std::fmt;
use std::str::FromStr;

use super::TransactionId;
use crate::errors::{RedoError, RedoErrorKind};

/// Durable commit point.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommitId {
    redo_seq: u64,
    txn_timestamp: i64,
    txn_id: TransactionId,
}

impl CommitId {
    /// Creates a CommitId.
    pub fn new(redo_seq: u64, txn_timestamp: i64, txn_id: TransactionId) -> Self {
        Self {
            redo_seq,
            txn_timestamp,
            txn_id,
        }
    }

    /// Sequence of the log file holding the commit record.
    pub fn redo_seq(&self) -> u64 {
        self.redo_seq
    }

    /// Timestamp of the commit record.
    pub fn txn_timestamp(&self) -> i64 {
        self.txn_timestamp
    }

    /// Transaction that was committed.
    pub fn txn_id(&self) -> TransactionId {
        self.txn_id
    }

    /// Whether a commit record with this id and timestamp is the one named here.
    pub fn matches(&self, txn_id: TransactionId, timestamp: i64) -> bool {
        self.txn_id == txn_id && self.txn_timestamp == timestamp
    }

    /// Encodes to the external string form.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decodes from the external string form.
    pub fn decode(s: &str) -> Result<Self, RedoError> {
        s.parse()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.redo_seq, self.txn_timestamp, self.txn_id)
    }
}

impl FromStr for CommitId {
    type Err = RedoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            RedoError::new(
                RedoErrorKind::InvalidCommitId,
                format!("malformed commit id: {:?}", s),
            )
        };

        // seq is unsigned, so the first dash always ends it
        let (seq, rest) = s.split_once('-').ok_or_else(invalid)?;

        // the timestamp may itself start with a minus sign
        let sep = rest
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '-')
            .map(|(i, _)| i)
            .ok_or_else(invalid)?;
        let (timestamp, txn) = (&rest[..sep], &rest[sep + 1..]);

        let redo_seq = seq.parse::<u64>().map_err(|_| invalid())?;
        let txn_timestamp = timestamp.parse::<i64>().map_err(|_| invalid())?;
        let txn_id = txn.parse::<TransactionId>().map_err(|_| invalid())?;

        Ok(Self {
            redo_seq,
            txn_timestamp,
            txn_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_form() {
        let cid = CommitId::new(12, 1700000000123, TransactionId::new(1700000000, 7));
        assert_eq!(cid.encode(), "12-1700000000123-1700000000.7");
    }

    #[test]
    fn test_roundtrip_including_negative_fields() {
        let samples = [
            CommitId::new(0, 0, TransactionId::new(0, 1)),
            CommitId::new(u64::MAX, i64::MAX, TransactionId::new(i32::MAX, i32::MAX)),
            CommitId::new(5, -42, TransactionId::new(-1, -9)),
            CommitId::new(9, i64::MIN, TransactionId::new(i32::MIN, 3)),
        ];
        for cid in samples {
            assert_eq!(CommitId::decode(&cid.encode()).unwrap(), cid, "{}", cid);
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        for bad in ["", "1", "1-2", "1-2-3", "a-2-3.4", "1-b-3.4", "-1-2-3.4", "1-2-3.x"] {
            let err = CommitId::decode(bad).expect_err(bad);
            assert_eq!(err.code(), "REDO_INVALID_COMMIT_ID");
        }
    }

    #[test]
    fn test_matches_requires_id_and_timestamp() {
        let txn = TransactionId::new(100, 2);
        let cid = CommitId::new(3, 555, txn);
        assert!(cid.matches(txn, 555));
        assert!(!cid.matches(txn, 556));
        assert!(!cid.matches(TransactionId::new(100, 3), 555));
    }
}
