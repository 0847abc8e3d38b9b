//! Guarded state: a mutex, a condvar, and the predicate callers wait on.
//!
//! The orchestrator needs the same shape three times — "the queue has
//! work", "this command ID has completed", "the worker has published its
//! identity" — so the shape is packaged once as [`Monitor`] and composed,
//! which also makes each instance testable in isolation.

use std::sync::{Condvar, Mutex};

/// A value guarded by a mutex with an associated condition variable.
///
/// Writers mutate through [`signal`](Monitor::signal) (which wakes all
/// waiters) or [`with`](Monitor::with) (which does not); readers block in
/// [`wait_until`](Monitor::wait_until) until their predicate produces a
/// value. Lock poisoning is treated as fatal — it implies a thread
/// panicked while holding the guard, and the state can no longer be
/// trusted.
pub struct Monitor<T> {
    state: Mutex<T>,
    cond: Condvar,
}

impl<T> Monitor<T> {
    /// Create a monitor around an initial state.
    pub fn new(initial: T) -> Self {
        Self {
            state: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    /// Run `f` with exclusive access to the state. Does not wake waiters.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    /// Run `f` with exclusive access to the state, then wake all waiters.
    pub fn signal<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        let result = f(&mut guard);
        self.cond.notify_all();
        result
    }

    /// Block until `f` yields `Some`, re-checking on every wakeup.
    ///
    /// The closure runs under the lock, so it can both test and mutate the
    /// state atomically (e.g. remove the completed ID it was waiting for).
    pub fn wait_until<R>(&self, mut f: impl FnMut(&mut T) -> Option<R>) -> R {
        let mut guard = self.state.lock().unwrap();
        loop {
            if let Some(result) = f(&mut guard) {
                return result;
            }
            guard = self.cond.wait(guard).unwrap();
        }
    }
}
