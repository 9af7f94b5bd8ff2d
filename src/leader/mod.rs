//! Leadership-aware deployment
//!
//! When the redo log sits on storage shared by several servers, only the
//! current leader may write it. This module adapts the manager to that
//! setting without changing how logging works:
//!
//! - Every rollover check is immediate on top of the size rules, so any
//!   non-empty log is rolled over after each write
//! - A write refused because this node is not the leader surfaces as the
//!   retryable `REDO_SERVICE_UNAVAILABLE` instead of halting
//! - On gaining leadership, each peer's log is rolled over: remotely when
//!   the peer answers, on the shared filesystem otherwise
//!
//! Leader election itself happens elsewhere. The election service reports
//! changes through `LeadershipListener`.

mod peer;
mod policy;
mod writer;

pub use peer::{
    FilesystemOnly, PeerRollover, PeerRolloverClient, PeerRolloverOutcome, PeerRolloverReport,
    PeerRolloverRequest,
};
pub use policy::LeaderAwarePolicy;
pub use writer::LeaderGuardedWriter;

use std::sync::atomic::{AtomicBool, Ordering};

/// Notification from the leader election service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadershipEvent {
    Gained,
    Lost,
    NoChange,
}

impl LeadershipEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadershipEvent::Gained => "gained",
            LeadershipEvent::Lost => "lost",
            LeadershipEvent::NoChange => "no_change",
        }
    }
}

/// Receives leadership changes.
pub trait LeadershipListener: Send + Sync {
    fn on_leadership_event(&self, event: LeadershipEvent);
}

/// Leadership flags shared by the policy and its writer
#[derive(Debug)]
pub struct LeaderState {
    leader: AtomicBool,
}

impl LeaderState {
    pub fn new(leader: bool) -> Self {
        Self {
            leader: AtomicBool::new(leader),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }
}
