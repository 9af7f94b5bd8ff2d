//! Redo log configuration
//!
//! Loaded from a JSON file and passed explicitly to the manager. Every
//! field except the paths has a default.
//!
//! ```json
//! {
//!   "log_path": "/opt/mail/redolog/redo.log",
//!   "archive_dir": "/opt/mail/redolog/archive",
//!   "rollover_soft_max_kb": 1024
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{RedoError, RedoResult};
use crate::observability::Severity;

/// Configuration of one redo log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedoConfig {
    /// Logging on or off. Transaction ids are issued either way.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Current log file
    pub log_path: PathBuf,

    /// Directory for rolled-over files
    pub archive_dir: PathBuf,

    /// Background fsync period; 0 fsyncs every append
    #[serde(default = "default_fsync_interval_ms")]
    pub fsync_interval_ms: u64,

    /// Minimum file age before a soft-max rollover
    #[serde(default = "default_rollover_min_age_minutes")]
    pub rollover_min_age_minutes: u64,

    /// Size at which a rollover is considered, once the file is old enough
    #[serde(default = "default_rollover_soft_max_kb")]
    pub rollover_soft_max_kb: u64,

    /// Size at which a rollover always happens
    #[serde(default = "default_rollover_hard_max_kb")]
    pub rollover_hard_max_kb: u64,

    /// Run crash recovery at startup
    #[serde(default = "default_enabled")]
    pub supports_crash_recovery: bool,

    /// Abort the process on a fatal log error
    #[serde(default = "default_enabled")]
    pub halt_on_fatal: bool,

    /// Id of this server. Recovery only redoes operations that originated
    /// here (or carry no origin).
    #[serde(default = "default_server_id")]
    pub server_id: String,

    /// Ask the store to persist committed data before each rollover
    #[serde(default)]
    pub flush_store_on_rollover: bool,

    /// TRACE, DEBUG, INFO, WARN, ERROR or FATAL
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Present when running under a leader election service
    #[serde(default)]
    pub leader: Option<LeaderConfig>,
}

/// Leadership-aware deployment settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderConfig {
    /// Peers whose logs this server rolls over when it becomes leader
    #[serde(default)]
    pub peers: Vec<PeerConfig>,

    /// Delete peer logs instead of archiving them when the peer does not
    /// answer
    #[serde(default)]
    pub discard_peer_logs: bool,
}

/// One peer's log, reachable on the shared filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub server_id: String,
    pub log_path: PathBuf,

    /// Where the peer archives its logs; `<log dir>/archive` when unset
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
}

impl PeerConfig {
    pub fn archive_dir(&self) -> PathBuf {
        match &self.archive_dir {
            Some(dir) => dir.clone(),
            None => self
                .log_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("archive"),
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_fsync_interval_ms() -> u64 {
    10
}
fn default_rollover_min_age_minutes() -> u64 {
    30
}
fn default_rollover_soft_max_kb() -> u64 {
    1024
}
fn default_rollover_hard_max_kb() -> u64 {
    4096
}
fn default_server_id() -> String {
    "localhost".to_string()
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl RedoConfig {
    /// Config with defaults for everything but the two paths.
    pub fn new(log_path: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: default_enabled(),
            log_path: log_path.into(),
            archive_dir: archive_dir.into(),
            fsync_interval_ms: default_fsync_interval_ms(),
            rollover_min_age_minutes: default_rollover_min_age_minutes(),
            rollover_soft_max_kb: default_rollover_soft_max_kb(),
            rollover_hard_max_kb: default_rollover_hard_max_kb(),
            supports_crash_recovery: default_enabled(),
            halt_on_fatal: default_enabled(),
            server_id: default_server_id(),
            flush_store_on_rollover: false,
            log_level: default_log_level(),
            leader: None,
        }
    }

    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> RedoResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RedoError::config_invalid(format!("failed to read config: {}", e))
                .with_path(path)
                .with_source(e)
        })?;

        let config: RedoConfig = serde_json::from_str(&content).map_err(|e| {
            RedoError::config_invalid(format!("invalid config JSON: {}", e))
                .with_path(path)
                .with_source(e)
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RedoResult<()> {
        if self.log_path.as_os_str().is_empty() {
            return Err(RedoError::config_invalid("log_path must not be empty"));
        }
        if self.archive_dir.as_os_str().is_empty() {
            return Err(RedoError::config_invalid("archive_dir must not be empty"));
        }
        if self.log_path.file_name().is_none() {
            return Err(RedoError::config_invalid("log_path must name a file").with_path(&self.log_path));
        }
        if self.log_dir() == self.archive_dir.as_path() {
            return Err(RedoError::config_invalid(
                "archive_dir must differ from the directory holding log_path",
            )
            .with_path(&self.archive_dir));
        }
        if self.rollover_soft_max_kb > self.rollover_hard_max_kb {
            return Err(RedoError::config_invalid("rollover_soft_max_kb exceeds rollover_hard_max_kb")
                .with_mismatch(
                    format!("<= {}", self.rollover_hard_max_kb),
                    self.rollover_soft_max_kb,
                ));
        }
        self.min_severity()?;
        if let Some(leader) = &self.leader {
            let mut seen = HashSet::new();
            for peer in &leader.peers {
                if peer.server_id == self.server_id {
                    return Err(RedoError::config_invalid(format!(
                        "peer list contains this server ({})",
                        peer.server_id
                    )));
                }
                if !seen.insert(peer.server_id.as_str()) {
                    return Err(RedoError::config_invalid(format!(
                        "duplicate peer server_id: {}",
                        peer.server_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Directory holding the current log
    pub fn log_dir(&self) -> &Path {
        self.log_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn fsync_interval(&self) -> Duration {
        Duration::from_millis(self.fsync_interval_ms)
    }

    pub fn rollover_min_age(&self) -> Duration {
        Duration::from_secs(self.rollover_min_age_minutes * 60)
    }

    pub fn rollover_soft_max_bytes(&self) -> u64 {
        self.rollover_soft_max_kb * 1024
    }

    pub fn rollover_hard_max_bytes(&self) -> u64 {
        self.rollover_hard_max_kb * 1024
    }

    /// Minimum severity for the structured logger
    pub fn min_severity(&self) -> RedoResult<Severity> {
        self.log_level
            .parse::<Severity>()
            .map_err(RedoError::config_invalid)
    }

    /// Origins whose operations this server redoes at startup
    pub fn recovery_origins(&self) -> HashSet<String> {
        HashSet::from([self.server_id.clone()])
    }
}
