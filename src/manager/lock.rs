//! Shared/exclusive lock over the log
//!
//! Loggers take the lock shared; rollover, checkpoint and the quiesce
//! operation take it exclusive. Waiting writers block new readers so a
//! steady stream of loggers cannot starve a rollover.
//!
//! `interrupt()` abandons every wait in progress: blocked callers get
//! `REDO_LOCK_INTERRUPTED`. Later acquisitions are unaffected, so the
//! shutdown path can still take the lock for its final rollover.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::errors::{RedoError, RedoResult};

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
    generation: u64,
}

/// Writer-preferring read/write lock with interruptible waits
#[derive(Debug, Default)]
pub struct LogLock {
    state: Mutex<LockState>,
    changed: Condvar,
}

impl LogLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, LockState>) -> MutexGuard<'a, LockState> {
        self.changed.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the lock shared.
    pub fn read(&self) -> RedoResult<ReadGuard<'_>> {
        let mut state = self.lock_state();
        let generation = state.generation;
        while state.writer || state.waiting_writers > 0 {
            state = self.wait(state);
            if state.generation != generation {
                return Err(RedoError::lock_interrupted("wait for shared log lock interrupted"));
            }
        }
        state.readers += 1;
        Ok(ReadGuard { lock: self })
    }

    /// Acquires the lock exclusive.
    pub fn write(&self) -> RedoResult<WriteGuard<'_>> {
        let mut state = self.lock_state();
        let generation = state.generation;
        state.waiting_writers += 1;
        while state.writer || state.readers > 0 {
            state = self.wait(state);
            if state.generation != generation {
                state.waiting_writers -= 1;
                drop(state);
                // readers parked behind this writer may proceed now
                self.changed.notify_all();
                return Err(RedoError::lock_interrupted("wait for exclusive log lock interrupted"));
            }
        }
        state.waiting_writers -= 1;
        state.writer = true;
        Ok(WriteGuard { lock: self })
    }

    /// Wakes every waiter with `REDO_LOCK_INTERRUPTED`.
    pub fn interrupt(&self) {
        let mut state = self.lock_state();
        state.generation = state.generation.wrapping_add(1);
        drop(state);
        self.changed.notify_all();
    }

    /// Number of shared holders
    pub fn readers(&self) -> usize {
        self.lock_state().readers
    }

    /// Whether the lock is held exclusive
    pub fn is_write_locked(&self) -> bool {
        self.lock_state().writer
    }

    fn release_read(&self) {
        let mut state = self.lock_state();
        state.readers -= 1;
        let last = state.readers == 0;
        drop(state);
        if last {
            self.changed.notify_all();
        }
    }

    fn release_write(&self) {
        let mut state = self.lock_state();
        state.writer = false;
        drop(state);
        self.changed.notify_all();
    }
}

/// Shared hold on a `LogLock`
#[derive(Debug)]
pub struct ReadGuard<'a> {
    lock: &'a LogLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Exclusive hold on a `LogLock`
#[derive(Debug)]
pub struct WriteGuard<'a> {
    lock: &'a LogLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}
