//! Crash recovery for the redo log
//!
//! # Startup sequence
//!
//! 1. Finish or undo an interrupted rollover (`RolloverManager::crash_recovery`)
//! 2. Scan the current log, truncating a damaged tail
//! 3. Redo every uncommitted operation owned by this server, in start order
//! 4. Log Commit for each success and Abort for each failure
//! 5. Hand operations flagged for deferral back to the manager
//! 6. After startup, redo the deferred operations on a background thread
//!
//! Orphans, late starts and checkpoint mismatches are reported and never
//! stop recovery.

mod player;
mod redo;

pub use player::{RedoPlayer, ScanStats};
pub use redo::{redo_and_terminate, redo_deferred, CrashRecovery, Disposition, RedoOutcome, TerminalLog};
