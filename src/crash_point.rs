//! Crash point injection for rollover testing
//!
//! Setting `REDOLOG_CRASH_POINT=<name>` makes the process abort the moment
//! execution reaches that point: no cleanup, no unwinding. Crash-recovery
//! tests run a child process with the variable set and then check what
//! `RolloverManager::crash_recovery` makes of the leftover files.
//!
//! ```bash
//! REDOLOG_CRASH_POINT=rollover_after_archive redolog ...
//! ```

use std::sync::OnceLock;

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn configured() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var("REDOLOG_CRASH_POINT").ok())
        .as_deref()
}

/// Whether `name` is the configured crash point
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    configured() == Some(name)
}

/// Abort the process if `name` is the configured crash point.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// Named crash points
pub mod points {
    /// Temp file written and synced, current file untouched
    pub const ROLLOVER_AFTER_TEMP: &str = "rollover_after_temp";
    /// Current file archived, temp not yet renamed into place
    pub const ROLLOVER_AFTER_ARCHIVE: &str = "rollover_after_archive";
    /// Temp renamed into place, sequence not yet bumped
    pub const ROLLOVER_AFTER_RENAME: &str = "rollover_after_rename";
    /// Checkpoint appended, rollover not started
    pub const CHECKPOINT_AFTER_WRITE: &str = "checkpoint_after_write";
    /// Pre-startup recovery redone, log not yet rolled over
    pub const RECOVERY_BEFORE_ROLLOVER: &str = "recovery_before_rollover";

    pub fn all() -> &'static [&'static str] {
        &[
            ROLLOVER_AFTER_TEMP,
            ROLLOVER_AFTER_ARCHIVE,
            ROLLOVER_AFTER_RENAME,
            CHECKPOINT_AFTER_WRITE,
            RECOVERY_BEFORE_ROLLOVER,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_unique() {
        let all = points::all();
        let mut sorted = all.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), all.len());
    }

    #[test]
    fn test_unknown_point_disabled() {
        // the test environment never sets a crash point
        assert!(!crash_point_enabled("no_such_point"));
        maybe_crash("no_such_point");
    }
}
