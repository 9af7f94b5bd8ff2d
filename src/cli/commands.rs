//! CLI command implementations
//!
//! Every command works on files only; none of them starts a manager or
//! writes to the current log. `recover-rollover` is the one command that
//! renames files.

use std::path::Path;

use serde_json::{json, Value};

use crate::config::RedoConfig;
use crate::manager::RedoLogManager;
use crate::observability::Logger;
use crate::op::OpRegistry;
use crate::rollover::{ArchivedLog, RolloverManager};
use crate::txn::CommitId;
use crate::wal::{FileLogReader, LogRecord};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Parse arguments and run the command. Failures are also reported on
/// stdout as a JSON error object.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    let result = run_command(cli.command).and_then(write_response);
    if let Err(ref e) = result {
        // stdout may be the broken part; the caller still sees `e`
        let _ = write_error(e.code_str(), &e.message());
    }
    result
}

/// Run one command and return its JSON result
pub fn run_command(cmd: Command) -> CliResult<Value> {
    match cmd {
        Command::Inspect { file, limit } => inspect(&file, limit),
        Command::Archives { config, from_seq } => archives(&load_config(&config)?, from_seq),
        Command::ChangedSince { config, commit_id } => changed_since(load_config(&config)?, &commit_id),
        Command::RecoverRollover { config } => recover_rollover(&load_config(&config)?),
    }
}

fn load_config(path: &Path) -> CliResult<RedoConfig> {
    let config = RedoConfig::load(path)?;
    Logger::set_min_severity(config.min_severity()?);
    Ok(config)
}

fn record_json(record: &LogRecord) -> Value {
    json!({
        "op": record.op_type.to_string(),
        "txn": record.txn_id.to_string(),
        "timestamp": record.timestamp,
        "start": record.is_start_marker(),
        "end": record.is_end_marker(),
        "mailbox": record.scope.to_string(),
        "origin": record.origin,
        "payload_len": record.payload.len(),
    })
}

fn archive_json(log: &ArchivedLog) -> Value {
    json!({
        "seq": log.sequence,
        "path": log.path.display().to_string(),
    })
}

/// Dump the header and records of a log file, read-only.
///
/// A damaged tail is reported in `error` instead of failing the command.
pub fn inspect(file: &Path, limit: Option<usize>) -> CliResult<Value> {
    let mut reader = FileLogReader::open(file, false)?;
    let header = *reader.header();
    let (records, error) = reader.read_all();

    let shown: Vec<Value> = records
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(record_json)
        .collect();
    Ok(json!({
        "path": file.display().to_string(),
        "header": {
            "seq": header.sequence,
            "create_time": header.create_time,
            "open": header.open,
        },
        "record_count": records.len(),
        "records": shown,
        "last_good_offset": reader.last_good_offset(),
        "file_size": reader.file_size(),
        "error": error.map(|e| e.to_string()),
    }))
}

/// List archived logs, oldest first.
pub fn archives(config: &RedoConfig, from_seq: Option<u64>) -> CliResult<Value> {
    let sequencer = RolloverManager::new(&config.log_path, &config.archive_dir);
    let logs = match from_seq {
        Some(seq) => sequencer.archived_logs_from_sequence(seq)?,
        None => sequencer.archived_logs()?,
    };
    Ok(json!({
        "archive_dir": config.archive_dir.display().to_string(),
        "archives": logs.iter().map(archive_json).collect::<Vec<_>>(),
    }))
}

/// Changed-mailboxes query against the files on disk.
pub fn changed_since(config: RedoConfig, commit_id: &str) -> CliResult<Value> {
    let since: CommitId = commit_id
        .parse()
        .map_err(|e: crate::errors::RedoError| CliError::invalid_argument(e.to_string()))?;
    let manager = RedoLogManager::from_config(config, OpRegistry::new());
    let changes = manager.changed_mailboxes_since(&since)?;
    Ok(json!({
        "since": since.encode(),
        "mailboxes": changes.mailboxes.iter().collect::<Vec<_>>(),
        "includes_all": changes.includes_all,
        "last_commit": changes.last_commit.encode(),
    }))
}

/// Rollover crash recovery only.
pub fn recover_rollover(config: &RedoConfig) -> CliResult<Value> {
    let sequencer = RolloverManager::new(&config.log_path, &config.archive_dir);
    sequencer.crash_recovery()?;
    Ok(json!({
        "log_path": config.log_path.display().to_string(),
        "current_exists": config.log_path.exists(),
    }))
}
