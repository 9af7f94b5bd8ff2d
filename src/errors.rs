//! Redo log error types
//!
//! Error codes:
//! - REDO_IO_FAILED (FATAL)
//! - REDO_CORRUPTION (ERROR)
//! - REDO_INVALID_COMMIT_ID (ERROR)
//! - REDO_LEADER_UNAVAILABLE (FATAL unless translated by a leadership-aware policy)
//! - REDO_SERVICE_UNAVAILABLE (RETRYABLE)
//! - REDO_REDO_FAILED (ERROR)
//! - REDO_CONFIG_INVALID (FATAL)
//! - REDO_LOCK_INTERRUPTED (ERROR)
//! - REDO_DISABLED (ERROR)
//! - REDO_DECODE_FAILED (ERROR)
//! - REDO_ROLLOVER_RECOVERY_FAILED (FATAL)
//! - REDO_RECORD_TOO_LARGE (ERROR)

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Severity levels for redo log errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, server continues
    Error,
    /// Condition is expected to clear; caller may retry
    Retryable,
    /// Continuing risks silent loss of logged operations
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Retryable => write!(f, "RETRYABLE"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedoErrorKind {
    /// Creating, opening, writing or syncing a log file failed
    IoFailed,
    /// A log file header or record failed validation
    Corruption,
    /// A CommitId does not match any retained log history
    InvalidCommitId,
    /// The log backend refused the write because this node is not the leader
    LeaderUnavailable,
    /// Retryable form of a leadership failure
    ServiceUnavailable,
    /// Re-executing an operation during recovery failed
    RedoFailed,
    /// Configuration did not validate
    ConfigInvalid,
    /// A lock wait was abandoned
    LockInterrupted,
    /// Logging is disabled
    Disabled,
    /// A record body could not be turned back into an operation
    DecodeFailed,
    /// Renaming files left behind by an interrupted rollover failed
    RolloverRecoveryFailed,
    /// A record would not fit in one frame; nothing was written
    RecordTooLarge,
}

impl RedoErrorKind {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            RedoErrorKind::IoFailed => "REDO_IO_FAILED",
            RedoErrorKind::Corruption => "REDO_CORRUPTION",
            RedoErrorKind::InvalidCommitId => "REDO_INVALID_COMMIT_ID",
            RedoErrorKind::LeaderUnavailable => "REDO_LEADER_UNAVAILABLE",
            RedoErrorKind::ServiceUnavailable => "REDO_SERVICE_UNAVAILABLE",
            RedoErrorKind::RedoFailed => "REDO_REDO_FAILED",
            RedoErrorKind::ConfigInvalid => "REDO_CONFIG_INVALID",
            RedoErrorKind::LockInterrupted => "REDO_LOCK_INTERRUPTED",
            RedoErrorKind::Disabled => "REDO_DISABLED",
            RedoErrorKind::DecodeFailed => "REDO_DECODE_FAILED",
            RedoErrorKind::RolloverRecoveryFailed => "REDO_ROLLOVER_RECOVERY_FAILED",
            RedoErrorKind::RecordTooLarge => "REDO_RECORD_TOO_LARGE",
        }
    }

    /// Returns the severity level for this kind
    pub fn severity(&self) -> Severity {
        match self {
            RedoErrorKind::IoFailed
            | RedoErrorKind::LeaderUnavailable
            | RedoErrorKind::ConfigInvalid
            | RedoErrorKind::RolloverRecoveryFailed => Severity::Fatal,
            RedoErrorKind::ServiceUnavailable => Severity::Retryable,
            RedoErrorKind::Corruption
            | RedoErrorKind::InvalidCommitId
            | RedoErrorKind::RedoFailed
            | RedoErrorKind::LockInterrupted
            | RedoErrorKind::Disabled
            | RedoErrorKind::DecodeFailed
            | RedoErrorKind::RecordTooLarge => Severity::Error,
        }
    }
}

impl fmt::Display for RedoErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Optional context attached to an error
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Mailbox the failing operation belonged to
    pub mailbox_id: Option<i32>,
    /// Value that was expected
    pub expected: Option<String>,
    /// Value that was found instead
    pub found: Option<String>,
    /// File involved in the failure
    pub path: Option<PathBuf>,
}

impl ErrorContext {
    fn is_empty(&self) -> bool {
        self.mailbox_id.is_none()
            && self.expected.is_none()
            && self.found.is_none()
            && self.path.is_none()
    }
}

/// Redo log error with kind, context and optional cause
#[derive(Debug)]
pub struct RedoError {
    kind: RedoErrorKind,
    message: String,
    context: ErrorContext,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl RedoError {
    /// Create an error of the given kind
    pub fn new(kind: RedoErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// I/O failure on a log file or directory
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(RedoErrorKind::IoFailed, message).with_source(source)
    }

    /// I/O failure with the path that caused it
    pub fn io_at(message: impl Into<String>, path: &Path, source: io::Error) -> Self {
        Self::io(message, source).with_path(path)
    }

    /// Log content failed validation
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(RedoErrorKind::Corruption, message)
    }

    /// CommitId is too old, or its marker record cannot be found
    pub fn invalid_commit_id(commit_id: impl fmt::Display) -> Self {
        Self::new(
            RedoErrorKind::InvalidCommitId,
            format!("invalid or expired commit id {}", commit_id),
        )
    }

    /// The log backend is not writable from this node
    pub fn leader_unavailable(message: impl Into<String>) -> Self {
        Self::new(RedoErrorKind::LeaderUnavailable, message)
    }

    /// Retryable service failure
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(RedoErrorKind::ServiceUnavailable, message)
    }

    /// Operation re-execution failed
    pub fn redo_failed(message: impl Into<String>) -> Self {
        Self::new(RedoErrorKind::RedoFailed, message)
    }

    /// Configuration rejected
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(RedoErrorKind::ConfigInvalid, message)
    }

    /// Lock wait abandoned
    pub fn lock_interrupted(message: impl Into<String>) -> Self {
        Self::new(RedoErrorKind::LockInterrupted, message)
    }

    /// Logging disabled
    pub fn disabled() -> Self {
        Self::new(RedoErrorKind::Disabled, "redo logging is disabled")
    }

    /// Record body could not be decoded
    pub fn decode_failed(message: impl Into<String>) -> Self {
        Self::new(RedoErrorKind::DecodeFailed, message)
    }

    /// Framed record exceeds the size a reader accepts
    pub fn record_too_large(framed_len: usize, limit: usize) -> Self {
        Self::new(RedoErrorKind::RecordTooLarge, "log record exceeds the maximum record size")
            .with_mismatch(format!("<= {}", limit), framed_len)
    }

    /// Rename during rollover crash recovery failed
    pub fn rollover_recovery_failed(message: impl Into<String>, path: &Path, source: io::Error) -> Self {
        Self::new(RedoErrorKind::RolloverRecoveryFailed, message)
            .with_path(path)
            .with_source(source)
    }

    /// Attach the mailbox id
    pub fn with_mailbox(mut self, mailbox_id: i32) -> Self {
        self.context.mailbox_id = Some(mailbox_id);
        self
    }

    /// Attach expected/found values
    pub fn with_mismatch(mut self, expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        self.context.expected = Some(expected.to_string());
        self.context.found = Some(found.to_string());
        self
    }

    /// Attach a file path
    pub fn with_path(mut self, path: &Path) -> Self {
        self.context.path = Some(path.to_path_buf());
        self
    }

    /// Attach the underlying cause
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind
    pub fn kind(&self) -> RedoErrorKind {
        self.kind
    }

    /// Returns the string code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    /// Returns the message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the attached context
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Whether continuing after this error risks losing logged operations
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Whether the caller may retry the operation
    pub fn is_retryable(&self) -> bool {
        self.severity() == Severity::Retryable
    }
}

impl fmt::Display for RedoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.kind.code(), self.message)?;
        if !self.context.is_empty() {
            let mut parts = Vec::new();
            if let Some(id) = self.context.mailbox_id {
                parts.push(format!("mailbox_id: {}", id));
            }
            if let Some(ref expected) = self.context.expected {
                parts.push(format!("expected: {}", expected));
            }
            if let Some(ref found) = self.context.found {
                parts.push(format!("found: {}", found));
            }
            if let Some(ref path) = self.context.path {
                parts.push(format!("path: {}", path.display()));
            }
            write!(f, " ({})", parts.join(", "))?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for RedoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type for redo log operations
pub type RedoResult<T> = Result<T, RedoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(RedoErrorKind::IoFailed.code(), "REDO_IO_FAILED");
        assert_eq!(RedoErrorKind::InvalidCommitId.code(), "REDO_INVALID_COMMIT_ID");
        assert_eq!(RedoErrorKind::ServiceUnavailable.code(), "REDO_SERVICE_UNAVAILABLE");
    }

    #[test]
    fn test_io_and_rename_failures_are_fatal() {
        let err = RedoError::io("open failed", io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(err.is_fatal());

        let err = RedoError::rollover_recovery_failed(
            "rename failed",
            Path::new("/tmp/x"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_service_unavailable_is_retryable() {
        let err = RedoError::service_unavailable("leader moved");
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_redo_failure_is_not_fatal() {
        assert!(!RedoError::redo_failed("boom").is_fatal());
        assert!(!RedoError::corruption("bad crc").is_fatal());
    }

    #[test]
    fn test_display_includes_context() {
        let err = RedoError::corruption("sequence mismatch")
            .with_mailbox(7)
            .with_mismatch(3, 5)
            .with_path(Path::new("/var/redo/redo.log"));
        let display = err.to_string();
        assert!(display.contains("REDO_CORRUPTION"));
        assert!(display.contains("mailbox_id: 7"));
        assert!(display.contains("expected: 3"));
        assert!(display.contains("found: 5"));
        assert!(display.contains("redo.log"));
    }

    #[test]
    fn test_source_is_exposed() {
        use std::error::Error;
        let err = RedoError::io("write", io::Error::new(io::ErrorKind::Other, "disk full"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("disk full"));
    }
}
