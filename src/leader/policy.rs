//! Policy for a log that only the leader may write

use std::sync::Arc;

use super::peer::{FilesystemOnly, PeerRollover, PeerRolloverClient, PeerRolloverReport};
use super::writer::LeaderGuardedWriter;
use super::{LeaderState, LeadershipEvent, LeadershipListener};
use crate::config::RedoConfig;
use crate::errors::{RedoError, RedoErrorKind, RedoResult};
use crate::manager::{default_rollover_needed, DefaultPolicy, RedoLogPolicy, RolloverCheck, RolloverLimits};
use crate::observability::{log_event_with_fields, Event};
use crate::rollover::RolloverManager;
use crate::wal::{FileLogWriter, LogWriter};

/// `RedoLogPolicy` for a leader-elected deployment.
pub struct LeaderAwarePolicy {
    base: DefaultPolicy,
    state: Arc<LeaderState>,
    peers: PeerRollover,
}

impl LeaderAwarePolicy {
    pub fn new(base: DefaultPolicy, state: Arc<LeaderState>, peers: PeerRollover) -> Self {
        Self { base, state, peers }
    }

    /// Starts as leader, with filesystem-only peer rollover.
    pub fn from_config(config: &RedoConfig) -> Self {
        Self::with_client(config, Arc::new(FilesystemOnly))
    }

    pub fn with_client(config: &RedoConfig, client: Arc<dyn PeerRolloverClient>) -> Self {
        let leader = config.leader.clone().unwrap_or_default();
        Self::new(
            DefaultPolicy::from_config(config),
            Arc::new(LeaderState::new(true)),
            PeerRollover::new(config.server_id.clone(), &leader, client),
        )
    }

    pub fn state(&self) -> &Arc<LeaderState> {
        &self.state
    }

    /// Rolls over every peer's log.
    pub fn rollover_peers(&self) -> Vec<PeerRolloverReport> {
        self.peers.rollover_all()
    }
}

impl RedoLogPolicy for LeaderAwarePolicy {
    /// Any non-empty log is due, on top of the size rules, so each
    /// leadership change lands on a file boundary.
    fn is_rollover_needed(&self, check: &RolloverCheck, limits: &RolloverLimits) -> bool {
        let immediate = RolloverCheck {
            immediate: true,
            ..*check
        };
        default_rollover_needed(&immediate, limits) || default_rollover_needed(check, limits)
    }

    fn signal_log_error(&self, err: RedoError) -> RedoError {
        if err.kind() != RedoErrorKind::LeaderUnavailable {
            return self.base.signal_log_error(err);
        }
        log_event_with_fields(
            Event::LogError,
            &[("code", err.code()), ("error", &err.to_string())],
        );
        RedoError::service_unavailable(err.message().to_string()).with_source(err)
    }

    fn create_log_writer(&self, config: &RedoConfig, sequencer: Arc<RolloverManager>) -> Arc<dyn LogWriter> {
        let inner: Arc<dyn LogWriter> = Arc::new(FileLogWriter::new(sequencer, config.fsync_interval()));
        Arc::new(LeaderGuardedWriter::new(inner, Arc::clone(&self.state)))
    }

    fn flush_store(&self) -> RedoResult<()> {
        self.base.flush_store()
    }
}

impl LeadershipListener for LeaderAwarePolicy {
    fn on_leadership_event(&self, event: LeadershipEvent) {
        match event {
            LeadershipEvent::Gained => self.state.set_leader(true),
            LeadershipEvent::Lost => self.state.set_leader(false),
            LeadershipEvent::NoChange => return,
        }
        log_event_with_fields(
            Event::LeadershipChanged,
            &[("event", event.as_str()), ("peers", &self.peers.peers().len().to_string())],
        );
        if event == LeadershipEvent::Gained {
            self.rollover_peers();
        }
    }
}
