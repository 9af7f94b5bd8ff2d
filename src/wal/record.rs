//! Redo log record framing
//!
//! Each record on disk:
//! - Record Length (u32 LE), total length including this field and the checksum
//! - Body (variable)
//! - Checksum (u32 LE), CRC32 over length + body
//!
//! Body:
//! - Op type (u16 LE)
//! - TransactionId (i32 LE time, i32 LE counter)
//! - Timestamp (i64 LE, epoch millis)
//! - Flags (u8): bit 0 start marker, bit 1 end marker
//! - Mailbox scope: tag (u8) then 0, 1 or n ids
//! - Origin server id (u32 LE length + UTF-8, length 0 = none)
//! - Payload (u32 LE length + bytes)

use thiserror::Error;

use super::checksum::{compute_checksum, verify_trailing_checksum};
use crate::errors::{RedoError, RedoResult};
use crate::op::{MailboxId, MailboxScope, OpType, RedoableOp};
use crate::txn::TransactionId;

/// Smallest possible framed record
pub const MIN_RECORD_SIZE: usize = 4 + MIN_BODY_SIZE + 4;

/// Upper bound on a single record, anything larger is treated as corruption
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

const MIN_BODY_SIZE: usize = 2 + 8 + 8 + 1 + 1 + 4 + 4;

const SCOPE_UNRESOLVED: u8 = 0;
const SCOPE_ALL: u8 = 1;
const SCOPE_ID: u8 = 2;
const SCOPE_LIST: u8 = 3;

const FLAG_START: u8 = 0b01;
const FLAG_END: u8 = 0b10;

/// Errors decoding a single record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes available than the record claims
    #[error("record truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Length field out of range
    #[error("invalid record length: {0}")]
    InvalidLength(usize),

    /// CRC mismatch
    #[error("checksum mismatch: computed {computed:08x}, stored {stored:08x}")]
    ChecksumMismatch { computed: u32, stored: u32 },

    /// Unknown mailbox scope tag
    #[error("unknown mailbox scope tag: {0}")]
    UnknownScopeTag(u8),

    /// Origin server id is not UTF-8
    #[error("origin server id is not valid UTF-8")]
    InvalidOrigin,

    /// Body fields overrun the framed length
    #[error("record body malformed: {0}")]
    MalformedBody(&'static str),
}

impl From<DecodeError> for RedoError {
    fn from(err: DecodeError) -> Self {
        RedoError::decode_failed(err.to_string()).with_source(err)
    }
}

/// Start/end marker flags
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordFlags {
    /// First record of a transaction
    pub start: bool,
    /// Commit or Abort
    pub end: bool,
}

impl RecordFlags {
    fn to_u8(self) -> u8 {
        let mut bits = 0;
        if self.start {
            bits |= FLAG_START;
        }
        if self.end {
            bits |= FLAG_END;
        }
        bits
    }

    fn from_u8(bits: u8) -> Self {
        Self {
            start: bits & FLAG_START != 0,
            end: bits & FLAG_END != 0,
        }
    }
}

/// One decoded record, independent of the operation type that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub op_type: OpType,
    pub txn_id: TransactionId,
    pub timestamp: i64,
    pub flags: RecordFlags,
    pub scope: MailboxScope,
    pub origin: Option<String>,
    pub payload: Vec<u8>,
}

impl LogRecord {
    /// Capture everything the log needs from an operation.
    pub fn from_op(op: &dyn RedoableOp) -> Self {
        Self {
            op_type: op.op_type(),
            txn_id: op.txn_id(),
            timestamp: op.timestamp(),
            flags: RecordFlags {
                start: op.is_start_marker(),
                end: op.is_end_marker(),
            },
            scope: op.mailbox_scope(),
            origin: op.origin_server().map(str::to_string),
            payload: op.payload(),
        }
    }

    pub fn is_start_marker(&self) -> bool {
        self.flags.start
    }

    pub fn is_end_marker(&self) -> bool {
        self.flags.end
    }

    /// Length of the framed record, computed without serializing it.
    pub fn framed_len(&self) -> usize {
        let scope = match &self.scope {
            MailboxScope::Unresolved | MailboxScope::All => 1,
            MailboxScope::Id(_) => 1 + 4,
            MailboxScope::List(ids) => 1 + 4 + 4 * ids.len(),
        };
        let origin = self.origin.as_ref().map_or(0, String::len);
        4 + (2 + 8 + 8 + 1) + scope + 4 + origin + 4 + self.payload.len() + 4
    }

    /// Refuses a record that readers would reject as corrupt.
    pub fn ensure_fits(&self) -> RedoResult<()> {
        let len = self.framed_len();
        if len > MAX_RECORD_SIZE {
            return Err(RedoError::record_too_large(len, MAX_RECORD_SIZE));
        }
        Ok(())
    }

    fn serialize_body(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MIN_BODY_SIZE + self.payload.len());

        buf.extend_from_slice(&self.op_type.code().to_le_bytes());
        buf.extend_from_slice(&self.txn_id.to_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.push(self.flags.to_u8());

        match &self.scope {
            MailboxScope::Unresolved => buf.push(SCOPE_UNRESOLVED),
            MailboxScope::All => buf.push(SCOPE_ALL),
            MailboxScope::Id(id) => {
                buf.push(SCOPE_ID);
                buf.extend_from_slice(&id.to_le_bytes());
            }
            MailboxScope::List(ids) => {
                buf.push(SCOPE_LIST);
                buf.extend_from_slice(&(ids.len() as u32).to_le_bytes());
                for id in ids {
                    buf.extend_from_slice(&id.to_le_bytes());
                }
            }
        }

        let origin = self.origin.as_deref().unwrap_or("");
        buf.extend_from_slice(&(origin.len() as u32).to_le_bytes());
        buf.extend_from_slice(origin.as_bytes());

        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);

        buf
    }

    /// Serialize the complete framed record.
    pub fn serialize(&self) -> Vec<u8> {
        let body = self.serialize_body();
        let record_length = (4 + body.len() + 4) as u32;

        let mut record = Vec::with_capacity(record_length as usize);
        record.extend_from_slice(&record_length.to_le_bytes());
        record.extend_from_slice(&body);
        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());

        record
    }

    /// Reads the length prefix of a framed record.
    pub fn framed_length(prefix: [u8; 4]) -> Result<usize, DecodeError> {
        let len = u32::from_le_bytes(prefix) as usize;
        if !(MIN_RECORD_SIZE..=MAX_RECORD_SIZE).contains(&len) {
            return Err(DecodeError::InvalidLength(len));
        }
        Ok(len)
    }

    /// Deserialize a framed record, verifying its checksum.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> Result<(Self, usize), DecodeError> {
        if data.len() < 4 {
            return Err(DecodeError::Truncated {
                needed: 4,
                available: data.len(),
            });
        }
        let record_length = Self::framed_length([data[0], data[1], data[2], data[3]])?;
        if data.len() < record_length {
            return Err(DecodeError::Truncated {
                needed: record_length,
                available: data.len(),
            });
        }

        verify_trailing_checksum(&data[..record_length])
            .map_err(|(computed, stored)| DecodeError::ChecksumMismatch { computed, stored })?;

        let record = Self::deserialize_body(&data[4..record_length - 4])?;
        Ok((record, record_length))
    }

    fn deserialize_body(body: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = BodyCursor { data: body, pos: 0 };

        let op_type = OpType::new(u16::from_le_bytes(cursor.take::<2>("op type")?));
        let txn_id = TransactionId::from_bytes(cursor.take::<8>("transaction id")?);
        let timestamp = i64::from_le_bytes(cursor.take::<8>("timestamp")?);
        let [flags] = cursor.take::<1>("flags")?;
        let flags = RecordFlags::from_u8(flags);

        let [tag] = cursor.take::<1>("scope tag")?;
        let scope = match tag {
            SCOPE_UNRESOLVED => MailboxScope::Unresolved,
            SCOPE_ALL => MailboxScope::All,
            SCOPE_ID => MailboxScope::Id(MailboxId::from_le_bytes(cursor.take::<4>("mailbox id")?)),
            SCOPE_LIST => {
                let count = u32::from_le_bytes(cursor.take::<4>("mailbox count")?) as usize;
                if count > cursor.remaining() / 4 {
                    return Err(DecodeError::MalformedBody("mailbox list"));
                }
                let mut ids = Vec::with_capacity(count);
                for _ in 0..count {
                    ids.push(MailboxId::from_le_bytes(cursor.take::<4>("mailbox id")?));
                }
                MailboxScope::List(ids)
            }
            other => return Err(DecodeError::UnknownScopeTag(other)),
        };

        let origin = cursor.take_prefixed("origin")?;
        let origin = if origin.is_empty() {
            None
        } else {
            Some(String::from_utf8(origin.to_vec()).map_err(|_| DecodeError::InvalidOrigin)?)
        };

        let payload = cursor.take_prefixed("payload")?.to_vec();

        Ok(Self {
            op_type,
            txn_id,
            timestamp,
            flags,
            scope,
            origin,
            payload,
        })
    }
}

struct BodyCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BodyCursor<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let slice = self.take_slice(N, field)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn take_slice(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::MalformedBody(field));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_prefixed(&mut self, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let len = u32::from_le_bytes(self.take::<4>(field)?) as usize;
        self.take_slice(len, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(scope: MailboxScope) -> LogRecord {
        LogRecord {
            op_type: OpType::new(120),
            txn_id: TransactionId::new(1700000000, 9),
            timestamp: 1700000000123,
            flags: RecordFlags { start: true, end: false },
            scope,
            origin: Some("mta-1".to_string()),
            payload: b"create message 42".to_vec(),
        }
    }

    #[test]
    fn test_record_survives_framing_for_each_scope() {
        let scopes = [
            MailboxScope::Unresolved,
            MailboxScope::All,
            MailboxScope::Id(7),
            MailboxScope::List(vec![3, 9, 11]),
        ];
        for scope in scopes {
            let record = sample(scope);
            let bytes = record.serialize();
            let (decoded, consumed) = LogRecord::deserialize(&bytes).unwrap();
            assert_eq!(consumed, bytes.len());
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn test_framed_len_matches_serialized_length() {
        for scope in [MailboxScope::All, MailboxScope::Id(7), MailboxScope::List(vec![3, 9, 11])] {
            let mut record = sample(scope);
            assert_eq!(record.framed_len(), record.serialize().len());
            record.origin = None;
            assert_eq!(record.framed_len(), record.serialize().len());
        }
    }

    #[test]
    fn test_oversized_record_refused() {
        let mut record = sample(MailboxScope::Id(1));
        assert!(record.ensure_fits().is_ok());
        record.payload = vec![0u8; MAX_RECORD_SIZE];
        let err = record.ensure_fits().unwrap_err();
        assert_eq!(err.code(), "REDO_RECORD_TOO_LARGE");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_missing_origin_encodes_as_none() {
        let mut record = sample(MailboxScope::Id(1));
        record.origin = None;
        let (decoded, _) = LogRecord::deserialize(&record.serialize()).unwrap();
        assert_eq!(decoded.origin, None);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut bytes = sample(MailboxScope::Id(7)).serialize();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        assert!(matches!(
            LogRecord::deserialize(&bytes),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_record_detected() {
        let bytes = sample(MailboxScope::Id(7)).serialize();
        let result = LogRecord::deserialize(&bytes[..bytes.len() - 3]);
        assert!(matches!(result, Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_invalid_length_detected() {
        assert!(matches!(
            LogRecord::framed_length(3u32.to_le_bytes()),
            Err(DecodeError::InvalidLength(3))
        ));
    }

    #[test]
    fn test_flags() {
        let flags = RecordFlags { start: false, end: true };
        assert_eq!(RecordFlags::from_u8(flags.to_u8()), flags);
    }
}
