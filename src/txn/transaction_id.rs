//! TransactionId and its generator
//!
//! A TransactionId is `{time, counter}`. `time` is a Unix-epoch-seconds
//! snapshot taken when the generator is created or its counter wraps;
//! `counter` increments per issued id. Ids order by `time`, then `counter`.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;

use crate::errors::RedoError;

/// Identity of a logical transaction.
///
/// Field order matters: the derived `Ord` compares `time` first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId {
    time: i32,
    counter: i32,
}

impl TransactionId {
    /// Creates a TransactionId from its two fields.
    pub const fn new(time: i32, counter: i32) -> Self {
        Self { time, counter }
    }

    /// Returns the time snapshot (epoch seconds).
    pub fn time(&self) -> i32 {
        self.time
    }

    /// Returns the counter.
    pub fn counter(&self) -> i32 {
        self.counter
    }

    /// Encodes to 8 bytes (time LE, counter LE).
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&self.time.to_le_bytes());
        buf[4..8].copy_from_slice(&self.counter.to_le_bytes());
        buf
    }

    /// Decodes from 8 bytes produced by `to_bytes`.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        let time = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let counter = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self { time, counter }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.time, self.counter)
    }
}

impl FromStr for TransactionId {
    type Err = RedoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (time, counter) = s
            .split_once('.')
            .ok_or_else(|| RedoError::decode_failed(format!("invalid transaction id: {}", s)))?;
        let time = time
            .parse::<i32>()
            .map_err(|e| RedoError::decode_failed(format!("invalid transaction id time '{}': {}", time, e)))?;
        let counter = counter
            .parse::<i32>()
            .map_err(|e| RedoError::decode_failed(format!("invalid transaction id counter '{}': {}", counter, e)))?;
        Ok(Self { time, counter })
    }
}

#[derive(Debug)]
struct GeneratorState {
    time: i32,
    counter: i32,
}

/// Issues strictly increasing TransactionIds.
///
/// Independent of the log sequencer: ids are needed even while logging is
/// disabled.
#[derive(Debug)]
pub struct TxnIdGenerator {
    state: Mutex<GeneratorState>,
}

impl Default for TxnIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TxnIdGenerator {
    /// Create a generator seeded with the current time.
    pub fn new() -> Self {
        Self::starting_at(now_seconds(), 1)
    }

    /// Create a generator at an explicit position.
    pub fn starting_at(time: i32, counter: i32) -> Self {
        Self {
            state: Mutex::new(GeneratorState {
                time,
                counter: counter.max(1),
            }),
        }
    }

    /// Returns the next id.
    ///
    /// On counter overflow the time is re-snapshotted and the counter
    /// restarts at 1. The new time is forced past the old one so the
    /// sequence stays strictly increasing even within the same second.
    pub fn next_id(&self) -> TransactionId {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let id = TransactionId::new(state.time, state.counter);
        if state.counter < i32::MAX {
            state.counter += 1;
        } else {
            state.time = now_seconds().max(state.time.saturating_add(1));
            state.counter = 1;
        }
        id
    }
}

fn now_seconds() -> i32 {
    let secs = Utc::now().timestamp();
    i32::try_from(secs).unwrap_or(i32::MAX)
}
