//! Redo log counters
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; values are exact once writers are quiet

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Operational counters for one log manager
#[derive(Debug, Default)]
pub struct RedoMetrics {
    records_logged: AtomicU64,
    bytes_logged: AtomicU64,
    logging_micros: AtomicU64,
    rollovers: AtomicU64,
    checkpoints: AtomicU64,
    ops_redone: AtomicU64,
    redo_failures: AtomicU64,
    orphans: AtomicU64,
    log_errors: AtomicU64,
}

impl RedoMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one successful append and the time it took.
    pub fn record_logged(&self, bytes: u64, elapsed: Duration) {
        self.records_logged.fetch_add(1, Ordering::Relaxed);
        self.bytes_logged.fetch_add(bytes, Ordering::Relaxed);
        self.logging_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn increment_rollovers(&self) {
        self.rollovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_checkpoints(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ops_redone(&self) {
        self.ops_redone.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_redo_failures(&self) {
        self.redo_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_orphans(&self, count: u64) {
        self.orphans.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_log_errors(&self) {
        self.log_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_logged(&self) -> u64 {
        self.records_logged.load(Ordering::Relaxed)
    }

    pub fn rollovers(&self) -> u64 {
        self.rollovers.load(Ordering::Relaxed)
    }

    pub fn checkpoints(&self) -> u64 {
        self.checkpoints.load(Ordering::Relaxed)
    }

    /// Average append latency in milliseconds, 0 when nothing was logged.
    pub fn avg_logging_millis(&self) -> f64 {
        let count = self.records_logged();
        if count == 0 {
            return 0.0;
        }
        self.logging_micros.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_logged: self.records_logged(),
            bytes_logged: self.bytes_logged.load(Ordering::Relaxed),
            avg_logging_millis: self.avg_logging_millis(),
            rollovers: self.rollovers(),
            checkpoints: self.checkpoints(),
            ops_redone: self.ops_redone.load(Ordering::Relaxed),
            redo_failures: self.redo_failures.load(Ordering::Relaxed),
            orphans: self.orphans.load(Ordering::Relaxed),
            log_errors: self.log_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of `RedoMetrics`
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub records_logged: u64,
    pub bytes_logged: u64,
    pub avg_logging_millis: f64,
    pub rollovers: u64,
    pub checkpoints: u64,
    pub ops_redone: u64,
    pub redo_failures: u64,
    pub orphans: u64,
    pub log_errors: u64,
}
