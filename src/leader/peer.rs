//! Rolling over peers' logs
//!
//! For each peer the new leader first asks the peer to roll over its own
//! log. When the peer cannot confirm, the leader handles the peer's file
//! directly on the shared filesystem: it is renamed into the peer's
//! archive directory under its header sequence, or deleted when the
//! deployment discards peer logs.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::{LeaderConfig, PeerConfig};
use crate::errors::{RedoError, RedoResult};
use crate::observability::{log_event_with_fields, Event};
use crate::rollover::RolloverManager;
use crate::wal::FileHeader;

/// One remote rollover request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRolloverRequest {
    /// Correlates the request with the peer's own log lines
    pub request_id: Uuid,
    /// Server asking
    pub leader_id: String,
    pub peer: PeerConfig,
}

/// Transport for remote rollover requests.
pub trait PeerRolloverClient: Send + Sync {
    /// Returns `Ok(true)` only when the peer confirmed a healthy rollover.
    fn request_rollover(&self, request: &PeerRolloverRequest) -> RedoResult<bool>;
}

/// Client for deployments with no remote channel: every peer is handled on
/// the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemOnly;

impl PeerRolloverClient for FilesystemOnly {
    fn request_rollover(&self, _request: &PeerRolloverRequest) -> RedoResult<bool> {
        Ok(false)
    }
}

/// How one peer's log was dealt with
#[derive(Debug)]
pub enum PeerRolloverOutcome {
    /// The peer rolled over itself
    Remote,
    /// Moved into the peer's archive directory
    Archived(PathBuf),
    /// Deleted
    Discarded,
    /// The peer had no current log
    Missing,
    Failed(RedoError),
}

#[derive(Debug)]
pub struct PeerRolloverReport {
    pub server_id: String,
    pub outcome: PeerRolloverOutcome,
}

/// Rolls over every configured peer.
pub struct PeerRollover {
    leader_id: String,
    peers: Vec<PeerConfig>,
    discard: bool,
    client: Arc<dyn PeerRolloverClient>,
}

impl PeerRollover {
    pub fn new(leader_id: impl Into<String>, config: &LeaderConfig, client: Arc<dyn PeerRolloverClient>) -> Self {
        Self {
            leader_id: leader_id.into(),
            peers: config.peers.clone(),
            discard: config.discard_peer_logs,
            client,
        }
    }

    pub fn peers(&self) -> &[PeerConfig] {
        &self.peers
    }

    /// Handles every peer. A failure on one peer does not stop the others.
    pub fn rollover_all(&self) -> Vec<PeerRolloverReport> {
        self.peers
            .iter()
            .map(|peer| PeerRolloverReport {
                server_id: peer.server_id.clone(),
                outcome: self.rollover_peer(peer),
            })
            .collect()
    }

    fn rollover_peer(&self, peer: &PeerConfig) -> PeerRolloverOutcome {
        let request = PeerRolloverRequest {
            request_id: Uuid::new_v4(),
            leader_id: self.leader_id.clone(),
            peer: peer.clone(),
        };
        let request_id = request.request_id.to_string();

        let reason = match self.client.request_rollover(&request) {
            Ok(true) => {
                log_event_with_fields(
                    Event::PeerRollover,
                    &[("peer", &peer.server_id), ("request_id", &request_id)],
                );
                return PeerRolloverOutcome::Remote;
            }
            Ok(false) => "peer did not confirm".to_string(),
            Err(err) => err.to_string(),
        };

        let outcome = match self.fallback(peer) {
            Ok(outcome) => outcome,
            Err(err) => PeerRolloverOutcome::Failed(err),
        };
        let action = match &outcome {
            PeerRolloverOutcome::Archived(path) => path.display().to_string(),
            PeerRolloverOutcome::Discarded => "discarded".to_string(),
            PeerRolloverOutcome::Missing => "missing".to_string(),
            PeerRolloverOutcome::Failed(err) => err.to_string(),
            PeerRolloverOutcome::Remote => "remote".to_string(),
        };
        log_event_with_fields(
            Event::PeerRolloverFallback,
            &[
                ("action", &action),
                ("peer", &peer.server_id),
                ("reason", &reason),
                ("request_id", &request_id),
            ],
        );
        outcome
    }

    /// Moves or deletes the peer's current log directly.
    fn fallback(&self, peer: &PeerConfig) -> RedoResult<PeerRolloverOutcome> {
        let path = &peer.log_path;
        if !path.exists() {
            return Ok(PeerRolloverOutcome::Missing);
        }
        if self.discard {
            fs::remove_file(path).map_err(|e| RedoError::io_at("failed to delete peer log", path, e))?;
            return Ok(PeerRolloverOutcome::Discarded);
        }

        let header = FileHeader::read_from(path)?;
        let sequencer = RolloverManager::new(path, peer.archive_dir());
        let archive = sequencer.rollover_file(header.sequence)?;
        match fs::rename(path, &archive) {
            Ok(()) => Ok(PeerRolloverOutcome::Archived(archive)),
            // the peer moved it itself in the meantime
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PeerRolloverOutcome::Missing),
            Err(e) => Err(RedoError::io_at("failed to archive peer log", path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Recording {
        answer: bool,
        seen: Mutex<Vec<String>>,
    }

    impl PeerRolloverClient for Recording {
        fn request_rollover(&self, request: &PeerRolloverRequest) -> RedoResult<bool> {
            self.seen.lock().unwrap().push(request.peer.server_id.clone());
            Ok(self.answer)
        }
    }

    fn leader_config(dir: &TempDir, discard: bool) -> LeaderConfig {
        LeaderConfig {
            peers: vec![PeerConfig {
                server_id: "mta2".to_string(),
                log_path: dir.path().join("mta2").join("redo.log"),
                archive_dir: None,
            }],
            discard_peer_logs: discard,
        }
    }

    fn write_peer_log(dir: &TempDir, seq: u64) -> PathBuf {
        let path = dir.path().join("mta2").join("redo.log");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, FileHeader::new(seq, 0).serialize()).unwrap();
        path
    }

    #[test]
    fn test_confirmed_remote_rollover_leaves_file() {
        let dir = TempDir::new().unwrap();
        let path = write_peer_log(&dir, 4);
        let client = Arc::new(Recording {
            answer: true,
            seen: Mutex::new(Vec::new()),
        });
        let peers = PeerRollover::new("mta1", &leader_config(&dir, false), client.clone());

        let reports = peers.rollover_all();
        assert!(matches!(reports[0].outcome, PeerRolloverOutcome::Remote));
        assert_eq!(client.seen.lock().unwrap().as_slice(), ["mta2"]);
        assert!(path.exists());
    }

    #[test]
    fn test_unconfirmed_peer_archived_by_sequence() {
        let dir = TempDir::new().unwrap();
        let path = write_peer_log(&dir, 17);
        let peers = PeerRollover::new("mta1", &leader_config(&dir, false), Arc::new(FilesystemOnly));

        let reports = peers.rollover_all();
        let PeerRolloverOutcome::Archived(archive) = &reports[0].outcome else {
            panic!("expected archive, got {:?}", reports[0].outcome);
        };
        assert!(!path.exists());
        assert!(archive.starts_with(dir.path().join("mta2").join("archive")));
        assert!(archive.to_string_lossy().ends_with("-seq17.log"));
    }

    #[test]
    fn test_discard_deletes_peer_log() {
        let dir = TempDir::new().unwrap();
        let path = write_peer_log(&dir, 2);
        let peers = PeerRollover::new("mta1", &leader_config(&dir, true), Arc::new(FilesystemOnly));
        let reports = peers.rollover_all();
        assert!(matches!(reports[0].outcome, PeerRolloverOutcome::Discarded));
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_peer_log() {
        let dir = TempDir::new().unwrap();
        let peers = PeerRollover::new("mta1", &leader_config(&dir, false), Arc::new(FilesystemOnly));
        assert!(matches!(peers.rollover_all()[0].outcome, PeerRolloverOutcome::Missing));
    }
}
