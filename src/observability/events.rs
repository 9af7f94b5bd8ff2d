//! Redo log lifecycle events
//!
//! Events are explicit and typed. Each carries its default severity.

use std::fmt;

use super::Severity;

/// Observable events in the redo log engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Manager start begins
    StartupBegin,
    /// Manager accepting work
    StartupComplete,
    /// Stop requested
    ShutdownBegin,
    /// Writer closed
    ShutdownComplete,
    /// Logging disabled by configuration
    LoggingDisabled,

    // Log file
    /// Log file opened
    LogOpened,
    /// Log file opened without a clean close
    LogUncleanClose,
    /// Log file closed
    LogClosed,
    /// Background fsync failed
    FsyncFailed,
    /// Write or flush failed
    LogError,

    // Rollover and checkpoint
    /// Rollover done
    Rollover,
    /// Checkpoint written
    Checkpoint,
    /// Temp file renamed into place after a crashed rollover
    RolloverRecovered,
    /// Stale temp file renamed out of the way
    RolloverTempBackedUp,
    /// Rollover failed part way; the current log was reopened
    RolloverAborted,

    // Recovery
    /// Crash recovery begins
    RecoveryBegin,
    /// Crash recovery done
    RecoveryComplete,
    /// Deferred recovery begins
    DeferredRecoveryBegin,
    /// Deferred recovery done
    DeferredRecoveryComplete,
    /// Deferred recovery stopped by shutdown
    DeferredRecoveryCancelled,
    /// Redo of an operation failed
    RedoFailed,
    /// Operation from another server left alone
    RedoSkipped,
    /// Commit or abort without a start record
    OrphanFound,
    /// Start record after its own commit or abort
    LateStart,
    /// Checkpoint disagrees with the replayed table
    CheckpointMismatch,
    /// Log truncated to the last good record
    LogTruncated,
    /// Unreadable tail in a read-only log
    LogTailIgnored,

    // Locking
    /// Lock wait abandoned
    LockInterrupted,

    // Leadership
    /// Leadership state changed
    LeadershipChanged,
    /// Peer log rolled over remotely
    PeerRollover,
    /// Peer log handled on the filesystem
    PeerRolloverFallback,

    // Fatal
    /// Process halting
    Halt,
}

impl Event {
    /// Returns the event name used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StartupBegin => "REDO_STARTUP_BEGIN",
            Event::StartupComplete => "REDO_STARTUP_COMPLETE",
            Event::ShutdownBegin => "REDO_SHUTDOWN_BEGIN",
            Event::ShutdownComplete => "REDO_SHUTDOWN_COMPLETE",
            Event::LoggingDisabled => "REDO_LOGGING_DISABLED",
            Event::LogOpened => "REDO_LOG_OPENED",
            Event::LogUncleanClose => "REDO_LOG_UNCLEAN_CLOSE",
            Event::LogClosed => "REDO_LOG_CLOSED",
            Event::FsyncFailed => "REDO_FSYNC_FAILED",
            Event::LogError => "REDO_LOG_ERROR",
            Event::Rollover => "REDO_ROLLOVER",
            Event::Checkpoint => "REDO_CHECKPOINT",
            Event::RolloverRecovered => "REDO_ROLLOVER_RECOVERED",
            Event::RolloverTempBackedUp => "REDO_ROLLOVER_TEMP_BACKED_UP",
            Event::RolloverAborted => "REDO_ROLLOVER_ABORTED",
            Event::RecoveryBegin => "REDO_RECOVERY_BEGIN",
            Event::RecoveryComplete => "REDO_RECOVERY_COMPLETE",
            Event::DeferredRecoveryBegin => "REDO_DEFERRED_RECOVERY_BEGIN",
            Event::DeferredRecoveryComplete => "REDO_DEFERRED_RECOVERY_COMPLETE",
            Event::DeferredRecoveryCancelled => "REDO_DEFERRED_RECOVERY_CANCELLED",
            Event::RedoFailed => "REDO_REDO_FAILED",
            Event::RedoSkipped => "REDO_REDO_SKIPPED",
            Event::OrphanFound => "REDO_ORPHAN_FOUND",
            Event::LateStart => "REDO_LATE_START",
            Event::CheckpointMismatch => "REDO_CHECKPOINT_MISMATCH",
            Event::LogTruncated => "REDO_LOG_TRUNCATED",
            Event::LogTailIgnored => "REDO_LOG_TAIL_IGNORED",
            Event::LockInterrupted => "REDO_LOCK_INTERRUPTED",
            Event::LeadershipChanged => "REDO_LEADERSHIP_CHANGED",
            Event::PeerRollover => "REDO_PEER_ROLLOVER",
            Event::PeerRolloverFallback => "REDO_PEER_ROLLOVER_FALLBACK",
            Event::Halt => "REDO_HALT",
        }
    }

    /// Default severity for this event
    pub fn severity(&self) -> Severity {
        match self {
            Event::Halt => Severity::Fatal,
            Event::FsyncFailed
            | Event::LogError
            | Event::RedoFailed
            | Event::OrphanFound
            | Event::LateStart
            | Event::RolloverAborted
            | Event::CheckpointMismatch => Severity::Error,
            Event::LogUncleanClose
            | Event::LogTruncated
            | Event::LogTailIgnored
            | Event::RolloverTempBackedUp
            | Event::DeferredRecoveryCancelled
            | Event::PeerRolloverFallback
            | Event::RedoSkipped
            | Event::LoggingDisabled => Severity::Warn,
            Event::Checkpoint | Event::LogOpened | Event::LogClosed => Severity::Debug,
            _ => Severity::Info,
        }
    }

    /// Check if this is a fatal event
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
