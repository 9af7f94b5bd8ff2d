//! Observability for the redo log
//!
//! - Structured logging (JSON), one line per event
//! - Typed lifecycle events
//! - Atomic counters per manager
//!
//! Observability never changes engine behavior. A failed log write is
//! dropped silently.
//!
//! # Usage
//!
//! ```ignore
//! use redolog::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::Rollover, &[("seq", "12")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, RedoMetrics};

/// Log a lifecycle event at its default severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields at its default severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

/// Log a lifecycle event at an explicit severity
pub fn log_event_at(severity: Severity, event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity, event.as_str(), fields);
}
