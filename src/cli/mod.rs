//! CLI module for redolog
//!
//! Offline tools over a redo log directory:
//! - inspect: dump a log file's header and records
//! - archives: list archived logs
//! - changed-since: answer the changed-mailboxes query
//! - recover-rollover: repair an interrupted rollover

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{archives, changed_since, inspect, recover_rollover, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
