//! CLI error types
//!
//! Every failure maps to one stable `REDOLOG_CLI_*` code for the JSON
//! error line. Redo log errors keep their own code in the message.

use std::io;

use thiserror::Error;

use crate::errors::{RedoError, RedoErrorKind};

/// Stable code reported in the error line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    ConfigError,
    IoError,
    InvalidArgument,
    CommandFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "REDOLOG_CLI_CONFIG_ERROR",
            Self::IoError => "REDOLOG_CLI_IO_ERROR",
            Self::InvalidArgument => "REDOLOG_CLI_INVALID_ARGUMENT",
            Self::CommandFailed => "REDOLOG_CLI_COMMAND_FAILED",
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    /// Unreadable or invalid configuration file
    #[error("configuration: {0}")]
    Config(#[source] RedoError),

    /// Writing the response failed
    #[error("output: {0}")]
    Io(#[from] io::Error),

    #[error("output encoding: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The redo log rejected the command
    #[error("{0}")]
    Command(#[source] RedoError),
}

impl CliError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn code(&self) -> CliErrorCode {
        match self {
            Self::Config(_) => CliErrorCode::ConfigError,
            Self::Io(_) | Self::Json(_) => CliErrorCode::IoError,
            Self::InvalidArgument(_) => CliErrorCode::InvalidArgument,
            Self::Command(_) => CliErrorCode::CommandFailed,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().code()
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<RedoError> for CliError {
    fn from(e: RedoError) -> Self {
        match e.kind() {
            RedoErrorKind::ConfigInvalid => Self::Config(e),
            _ => Self::Command(e),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redo_errors_mapped() {
        let err: CliError = RedoError::config_invalid("bad").into();
        assert_eq!(err.code_str(), "REDOLOG_CLI_CONFIG_ERROR");

        let err: CliError = RedoError::invalid_commit_id("1-2-3.4").into();
        assert_eq!(err.code(), CliErrorCode::CommandFailed);
        assert!(err.message().contains("REDO_INVALID_COMMIT_ID"));
    }

    #[test]
    fn test_output_failures_are_io() {
        let err: CliError = io::Error::new(io::ErrorKind::BrokenPipe, "closed").into();
        assert_eq!(err.code_str(), "REDOLOG_CLI_IO_ERROR");
        assert_eq!(CliError::invalid_argument("x").code_str(), "REDOLOG_CLI_INVALID_ARGUMENT");
    }
}
