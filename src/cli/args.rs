//! CLI argument definitions using clap
//!
//! Commands:
//! - redolog inspect <file>
//! - redolog archives --config <path>
//! - redolog changed-since --config <path> --commit-id <id>
//! - redolog recover-rollover --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// redolog - mail store redo log tools
#[derive(Parser, Debug)]
#[command(name = "redolog")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dump the header and records of one log file
    Inspect {
        /// Current or archived log file
        file: PathBuf,

        /// Print at most this many records
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List archived logs
    Archives {
        /// Path to configuration file
        #[arg(long, default_value = "./redolog.json")]
        config: PathBuf,

        /// Only archives with this sequence or later
        #[arg(long)]
        from_seq: Option<u64>,
    },

    /// Mailboxes committed to after a commit id
    ChangedSince {
        /// Path to configuration file
        #[arg(long, default_value = "./redolog.json")]
        config: PathBuf,

        /// Commit id in seq-timestamp-time.counter form
        #[arg(long)]
        commit_id: String,
    },

    /// Finish or undo a rollover interrupted by a crash
    RecoverRollover {
        /// Path to configuration file
        #[arg(long, default_value = "./redolog.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_since_args() {
        let cli = Cli::try_parse_from([
            "redolog",
            "changed-since",
            "--config",
            "/etc/redolog.json",
            "--commit-id",
            "4-1700000000000-1700000000.7",
        ])
        .unwrap();
        match cli.command {
            Command::ChangedSince { config, commit_id } => {
                assert_eq!(config, PathBuf::from("/etc/redolog.json"));
                assert_eq!(commit_id, "4-1700000000000-1700000000.7");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_inspect_default_limit() {
        let cli = Cli::try_parse_from(["redolog", "inspect", "redo.log"]).unwrap();
        assert!(matches!(cli.command, Command::Inspect { limit: None, .. }));
    }
}
