//! Deployment policy for the log manager
//!
//! The manager delegates three decisions to an injected policy: whether a
//! rollover is due, what to do with a log error, and which writer to use.
//! `DefaultPolicy` is the single-node behavior. The leadership-aware
//! policy lives in `crate::leader`.

use std::sync::Arc;
use std::time::Duration;

use crate::config::RedoConfig;
use crate::errors::{RedoError, RedoResult};
use crate::observability::{log_event_with_fields, Event};
use crate::rollover::RolloverManager;
use crate::wal::{FileLogWriter, LogWriter};

/// Rollover thresholds
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RolloverLimits {
    pub min_age: Duration,
    pub soft_max_bytes: u64,
    pub hard_max_bytes: u64,
}

impl RolloverLimits {
    pub fn from_config(config: &RedoConfig) -> Self {
        Self {
            min_age: config.rollover_min_age(),
            soft_max_bytes: config.rollover_soft_max_bytes(),
            hard_max_bytes: config.rollover_hard_max_bytes(),
        }
    }
}

/// Current log state as seen by a rollover check
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RolloverCheck {
    /// Roll over whenever the log has any records
    pub immediate: bool,
    pub is_empty: bool,
    pub size: u64,
    /// Size right after the last open or rollover
    pub initial_size: u64,
    pub age: Duration,
}

/// The standard rollover rule.
///
/// - immediate: any records at all
/// - otherwise: at the hard max, or at the soft max once the file has grown
///   since it was opened and is at least `min_age` old
pub fn default_rollover_needed(check: &RolloverCheck, limits: &RolloverLimits) -> bool {
    if check.immediate {
        return !check.is_empty;
    }
    if check.size >= limits.hard_max_bytes {
        return true;
    }
    check.size >= limits.soft_max_bytes
        && check.size > check.initial_size
        && check.age >= limits.min_age
}

/// Hooks a deployment can override.
pub trait RedoLogPolicy: Send + Sync {
    fn is_rollover_needed(&self, check: &RolloverCheck, limits: &RolloverLimits) -> bool {
        default_rollover_needed(check, limits)
    }

    /// Called with every error from the writer or from startup. Returns the
    /// error the caller should see; may halt the process instead.
    fn signal_log_error(&self, err: RedoError) -> RedoError;

    fn create_log_writer(
        &self,
        config: &RedoConfig,
        sequencer: Arc<RolloverManager>,
    ) -> Arc<dyn LogWriter> {
        Arc::new(FileLogWriter::new(sequencer, config.fsync_interval()))
    }

    /// Persist committed store data before a rollover discards log content.
    fn flush_store(&self) -> RedoResult<()> {
        Ok(())
    }
}

type StoreFlush = Box<dyn Fn() -> RedoResult<()> + Send + Sync>;

/// Single-node policy: fatal errors halt the process when configured to.
pub struct DefaultPolicy {
    halt_on_fatal: bool,
    store_flush: Option<StoreFlush>,
}

impl DefaultPolicy {
    pub fn new(halt_on_fatal: bool) -> Self {
        Self {
            halt_on_fatal,
            store_flush: None,
        }
    }

    pub fn from_config(config: &RedoConfig) -> Self {
        Self::new(config.halt_on_fatal)
    }

    /// Installs the store flush run before each rollover.
    pub fn with_store_flush(mut self, flush: impl Fn() -> RedoResult<()> + Send + Sync + 'static) -> Self {
        self.store_flush = Some(Box::new(flush));
        self
    }
}

impl std::fmt::Debug for DefaultPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultPolicy")
            .field("halt_on_fatal", &self.halt_on_fatal)
            .field("store_flush", &self.store_flush.is_some())
            .finish()
    }
}

/// Logs `err` and, for a fatal error with halting enabled, aborts.
pub fn report_log_error(err: RedoError, halt_on_fatal: bool) -> RedoError {
    log_event_with_fields(
        Event::LogError,
        &[("code", err.code()), ("error", &err.to_string())],
    );
    if err.is_fatal() && halt_on_fatal {
        log_event_with_fields(Event::Halt, &[("code", err.code()), ("error", &err.to_string())]);
        std::process::abort();
    }
    err
}

impl RedoLogPolicy for DefaultPolicy {
    fn signal_log_error(&self, err: RedoError) -> RedoError {
        report_log_error(err, self.halt_on_fatal)
    }

    fn flush_store(&self) -> RedoResult<()> {
        match &self.store_flush {
            Some(flush) => flush(),
            None => Ok(()),
        }
    }
}
