//! Crash tests
//!
//! - Every scenario aborts a real child process at a crash point
//! - Real filesystem (no mocks)
//! - Recovery is checked by starting a fresh manager on the leftovers

mod common;
mod crash;
