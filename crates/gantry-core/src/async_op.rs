//! Future-style result cells for value-returning commands.
//!
//! An [`AsyncOp`] is shared between the issuer of a command (who polls or
//! blocks on it) and the thread that eventually executes the command (which
//! resolves it). The cell moves through exactly two states: *pending* and
//! *resolved*. Resolution is one-shot — a second resolution is ignored.

use std::any::Any;
use std::sync::{Arc, Condvar, Mutex};

/// Internal state of a result cell.
enum OpStatus {
    /// The owning command has not executed (or has not resolved) yet.
    Pending,
    /// The command resolved. `None` is the empty sentinel used when the
    /// command body never supplied a value.
    Resolved(Option<Box<dyn Any + Send>>),
}

struct OpInner {
    status: Mutex<OpStatus>,
    done: Condvar,
}

/// A value that will exist after its owning command executes.
///
/// Cloning is cheap and shares the underlying cell: the copy held inside
/// the queued command and the copy returned to the issuer observe the same
/// resolution.
///
/// # Examples
///
/// ```
/// use gantry_core::AsyncOp;
///
/// let op = AsyncOp::new();
/// assert!(!op.is_resolved());
///
/// op.resolve(42u32);
/// assert!(op.is_resolved());
/// assert_eq!(op.take::<u32>(), Some(42));
/// ```
#[derive(Clone)]
pub struct AsyncOp {
    inner: Arc<OpInner>,
}

impl AsyncOp {
    /// Create a new, pending result cell.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(OpInner {
                status: Mutex::new(OpStatus::Pending),
                done: Condvar::new(),
            }),
        }
    }

    /// Resolve the cell with a value, waking any blocked waiters.
    ///
    /// The first resolution wins. A second call is ignored and logged at
    /// warn level — resolving twice is a protocol slip on the command's
    /// side, never a crash for the issuer.
    pub fn resolve<T: Any + Send>(&self, value: T) {
        self.resolve_boxed(Some(Box::new(value)));
    }

    /// Resolve the cell with the empty sentinel (no payload).
    ///
    /// Used by playback for commands that completed without resolving
    /// their result, so waiters are never left hanging.
    pub fn resolve_empty(&self) {
        self.resolve_boxed(None);
    }

    fn resolve_boxed(&self, payload: Option<Box<dyn Any + Send>>) {
        let mut status = self.inner.status.lock().unwrap();
        if matches!(*status, OpStatus::Pending) {
            *status = OpStatus::Resolved(payload);
            self.inner.done.notify_all();
        } else {
            log::warn!("async op resolved more than once; extra resolution ignored");
        }
    }

    /// Whether the cell has been resolved.
    pub fn is_resolved(&self) -> bool {
        matches!(
            *self.inner.status.lock().unwrap(),
            OpStatus::Resolved(_)
        )
    }

    /// Block the calling thread until the cell is resolved.
    pub fn wait(&self) {
        let mut status = self.inner.status.lock().unwrap();
        while matches!(*status, OpStatus::Pending) {
            status = self.inner.done.wait(status).unwrap();
        }
    }

    /// Extract the resolved payload, downcast to `T`.
    ///
    /// Returns `None` while pending, after the payload has already been
    /// taken, when the cell was resolved with the empty sentinel, or when
    /// the payload is not a `T` (the payload is left in place in that
    /// last case). Non-blocking; call [`wait`](AsyncOp::wait) first for
    /// blocking semantics.
    pub fn take<T: Any>(&self) -> Option<T> {
        let mut status = self.inner.status.lock().unwrap();
        match &mut *status {
            OpStatus::Resolved(payload) => {
                if payload.as_ref().is_some_and(|p| p.is::<T>()) {
                    let boxed = payload.take()?;
                    boxed.downcast::<T>().ok().map(|b| *b)
                } else {
                    None
                }
            }
            OpStatus::Pending => None,
        }
    }
}

impl Default for AsyncOp {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AsyncOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOp")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
