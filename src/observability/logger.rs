//! Structured JSON logger
//!
//! One line per event: `ts`, `event` and `severity` first, then the
//! event's fields sorted by key. ERROR and FATAL lines go to stderr, the
//! rest to stdout. Writes are synchronous and a failed write is dropped.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Per-record tracing
    Trace = 0,
    /// Diagnostic detail
    Debug = 1,
    /// Normal operations
    Info = 2,
    /// Recoverable issues
    Warn = 3,
    /// Operation failures
    Error = 4,
    /// Unrecoverable, process halts
    Fatal = 5,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Severity::Trace,
            1 => Severity::Debug,
            2 => Severity::Info,
            3 => Severity::Warn,
            4 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Severity::Trace),
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARN" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            "FATAL" => Ok(Severity::Fatal),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);

/// A structured logger that outputs JSON logs
pub struct Logger;

impl Logger {
    /// Sets the lowest severity that is written. Defaults to INFO.
    pub fn set_min_severity(severity: Severity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    /// Current minimum severity
    pub fn min_severity() -> Severity {
        Severity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    /// Whether a line at `severity` would be written
    pub fn enabled(severity: Severity) -> bool {
        severity >= Self::min_severity()
    }

    /// Writes one event line if `severity` passes the threshold.
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(severity) {
            return;
        }
        let line = format_line(Utc::now(), severity, event, fields);
        let _ = if severity >= Severity::Error {
            io::stderr().lock().write_all(line.as_bytes())
        } else {
            io::stdout().lock().write_all(line.as_bytes())
        };
    }
}

fn push_json_str(out: &mut String, s: &str) {
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => out.push_str("\"\""),
    }
}

fn format_line(at: DateTime<Utc>, severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
    sorted.sort_by_key(|(key, _)| *key);

    let mut line = String::with_capacity(160);
    line.push_str("{\"ts\":");
    push_json_str(&mut line, &at.to_rfc3339_opts(SecondsFormat::Millis, true));
    line.push_str(",\"event\":");
    push_json_str(&mut line, event);
    line.push_str(",\"severity\":\"");
    line.push_str(severity.as_str());
    line.push('"');
    for (key, value) in sorted {
        line.push(',');
        push_json_str(&mut line, key);
        line.push(':');
        push_json_str(&mut line, value);
    }
    line.push_str("}\n");
    line
}
