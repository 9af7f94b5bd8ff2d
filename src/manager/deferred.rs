//! Post-startup recovery thread

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::state::LogCore;
use crate::errors::{RedoError, RedoResult};
use crate::observability::{log_event_with_fields, Event};
use crate::op::RedoableOp;
use crate::recovery::redo_deferred;

const THREAD_NAME: &str = "post-startup-recovery";

/// Starts redoing `ops` in the background. `stop()` sets
/// `cancel_deferred` and joins the returned handle.
pub(crate) fn spawn(core: Arc<LogCore>, ops: Vec<Arc<dyn RedoableOp>>) -> RedoResult<JoinHandle<()>> {
    thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || run(&core, &ops))
        .map_err(|e| RedoError::io("failed to start post-startup recovery", e))
}

fn run(core: &LogCore, ops: &[Arc<dyn RedoableOp>]) {
    let started = Instant::now();
    log_event_with_fields(Event::DeferredRecoveryBegin, &[("ops", &ops.len().to_string())]);

    let origins = core.config.recovery_origins();
    let result = redo_deferred(ops, &origins, core, &core.metrics, || {
        core.cancel_deferred.load(Ordering::SeqCst)
    });

    let elapsed = started.elapsed().as_millis().to_string();
    match result {
        Ok(outcome) if outcome.cancelled => {
            let remaining = ops.len() as u64 - outcome.terminated() - outcome.skipped;
            log_event_with_fields(
                Event::DeferredRecoveryCancelled,
                &[
                    ("elapsed_ms", &elapsed),
                    ("redone", &outcome.redone.to_string()),
                    ("remaining", &remaining.to_string()),
                ],
            );
        }
        Ok(outcome) => log_event_with_fields(
            Event::DeferredRecoveryComplete,
            &[
                ("elapsed_ms", &elapsed),
                ("failed", &outcome.failed.to_string()),
                ("redone", &outcome.redone.to_string()),
                ("skipped", &outcome.skipped.to_string()),
            ],
        ),
        Err(err) => log_event_with_fields(
            Event::LogError,
            &[("error", &err.to_string()), ("phase", THREAD_NAME)],
        ),
    }
}
