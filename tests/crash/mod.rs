//! Crash testing framework
//!
//! - Crash injection at the named points in `redolog::crash_point`
//! - Subprocess management
//! - Post-crash validation by starting a manager on the leftovers

pub mod harness;
pub mod scenarios;
