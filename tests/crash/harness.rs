//! Crash test harness for subprocess management
//!
//! A scenario is a pair of tests in the same binary:
//! - the parent re-runs the test binary filtered to the child test, with
//!   `REDOLOG_CRASH_POINT` and `REDOLOG_CRASH_DIR` set
//! - the child sees `REDOLOG_CRASH_DIR`, runs its workload there and is
//!   aborted at the crash point
//!
//! The parent then starts a manager on what the child left behind. Run
//! normally, a child test finds no directory and returns at once.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

/// Directory handed to the child
pub const DIR_VAR: &str = "REDOLOG_CRASH_DIR";

/// Result of a crash test execution
#[derive(Debug)]
pub struct CrashTestResult {
    /// Whether the process crashed as expected
    pub crashed: bool,
    /// Exit status if available
    pub exit_status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
}

/// Set only inside a child process.
pub fn child_dir() -> Option<PathBuf> {
    env::var_os(DIR_VAR).map(PathBuf::from)
}

/// Runs the test named `child` in a subprocess with `crash_point` enabled.
pub fn run_with_crash_point(child: &str, crash_point: &str, data_dir: &Path) -> CrashTestResult {
    let exe = match env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            return CrashTestResult {
                crashed: false,
                exit_status: None,
                stdout: String::new(),
                stderr: format!("no test executable: {}", e),
            }
        }
    };
    let output = Command::new(exe)
        .args([child, "--exact", "--nocapture", "--test-threads=1"])
        .env("REDOLOG_CRASH_POINT", crash_point)
        .env(DIR_VAR, data_dir)
        .output();

    match output {
        Ok(output) => CrashTestResult {
            crashed: !output.status.success(),
            exit_status: Some(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        },
        Err(e) => CrashTestResult {
            crashed: false,
            exit_status: None,
            stdout: String::new(),
            stderr: format!("Failed to execute: {}", e),
        },
    }
}

/// Fails the test unless the child died at the crash point.
pub fn assert_crashed(crash_point: &str, result: &CrashTestResult) {
    if !result.crashed || !result.stderr.contains(crash_point) {
        report_failure(
            crash_point,
            "child workload",
            "abort at crash point",
            &format!("{:?}", result.exit_status),
            &result.stderr,
        );
        panic!("child did not crash at {}", crash_point);
    }
}

/// Leftover rollover temp files that were neither renamed nor backed up
pub fn pending_temp_files(log_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            name.starts_with(redolog::rollover::TEMP_PREFIX) && name.ends_with(".log")
        })
        .collect()
}

/// Report crash test failure
pub fn report_failure(crash_point: &str, operation: &str, expected: &str, actual: &str, logs: &str) {
    eprintln!("=== CRASH TEST FAILURE ===");
    eprintln!("Crash point: {}", crash_point);
    eprintln!("Operation: {}", operation);
    eprintln!("Expected: {}", expected);
    eprintln!("Actual: {}", actual);
    eprintln!("Child logs:\n{}", logs);
    eprintln!("==========================");
}
