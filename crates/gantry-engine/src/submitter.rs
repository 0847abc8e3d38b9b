//! Per-thread submit queues.
//!
//! A [`SubmitQueue`] gives a producer thread ergonomic, thread-affine
//! queuing without passing a queue object around: one handle per OS
//! thread, created lazily by
//! [`CoreThread::get_queue`](crate::CoreThread::get_queue), cached by the
//! caller thereafter. Queuing into the handle costs one uncontended mutex
//! acquisition; the only other party that ever takes that mutex is
//! [`CoreThread::submit_all`](crate::CoreThread::submit_all) flushing the
//! queue on the producer's behalf.

use std::sync::{Arc, Mutex, Weak};
use std::thread::ThreadId;

use gantry_core::{AsyncOp, Command};

use crate::core_thread::{CoreShared, SubmitError};
use crate::queue::CommandQueue;

struct QueueInner {
    thread: ThreadId,
    sim: bool,
    buffer: Mutex<CommandQueue>,
    shared: Weak<CoreShared>,
}

/// Cloneable handle to one thread's command buffer.
///
/// Commands queued here are invisible to the core thread until
/// [`submit_to_core`](SubmitQueue::submit_to_core) mails the buffered
/// batch to its synchronized internal queue.
#[derive(Clone)]
pub struct SubmitQueue {
    inner: Arc<QueueInner>,
}

impl SubmitQueue {
    pub(crate) fn new(thread: ThreadId, sim: bool, shared: Weak<CoreShared>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                thread,
                sim,
                buffer: Mutex::new(CommandQueue::new()),
                shared,
            }),
        }
    }

    /// The OS thread this queue belongs to.
    pub fn thread_id(&self) -> ThreadId {
        self.inner.thread
    }

    /// Whether this is the sim thread's queue.
    ///
    /// The sim thread's batch is submitted last by
    /// [`CoreThread::submit_all`](crate::CoreThread::submit_all), so
    /// worker-submitted work is visible to the core thread first.
    pub fn is_sim_thread(&self) -> bool {
        self.inner.sim
    }

    /// Buffer a fire-and-forget command.
    pub fn queue_command(&self, f: impl FnOnce() + Send + 'static) {
        self.inner.buffer.lock().unwrap().queue(f);
    }

    /// Buffer a value-producing command, returning its result cell.
    ///
    /// The cell resolves once the core thread has executed the command —
    /// which requires a later [`submit_to_core`](SubmitQueue::submit_to_core)
    /// (or `submit_all`) to deliver it.
    pub fn queue_return_command(&self, f: impl FnOnce(&AsyncOp) + Send + 'static) -> AsyncOp {
        self.inner.buffer.lock().unwrap().queue_return(f)
    }

    /// Number of commands buffered and not yet submitted.
    pub fn pending(&self) -> usize {
        self.inner.buffer.lock().unwrap().len()
    }

    /// Mail the buffered batch to the core thread's internal queue.
    ///
    /// With `block` set, the call returns only after the core thread has
    /// executed the entire just-submitted batch (and everything queued
    /// ahead of it).
    ///
    /// If the engine has shut down, buffered commands are failed — their
    /// result cells resolve to the empty sentinel — and
    /// [`SubmitError::Shutdown`] is returned.
    pub fn submit_to_core(&self, block: bool) -> Result<(), SubmitError> {
        let batch = self.inner.buffer.lock().unwrap().flush();
        match self.inner.shared.upgrade() {
            Some(shared) => shared.push_commands(batch, block),
            None => {
                fail_batch(batch);
                Err(SubmitError::Shutdown)
            }
        }
    }
}

impl std::fmt::Debug for SubmitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitQueue")
            .field("thread", &self.inner.thread)
            .field("sim", &self.inner.sim)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Resolve every command's result cell without executing, so no issuer
/// is left waiting on work that will never run.
fn fail_batch(batch: Vec<Command>) {
    for command in batch {
        command.fail();
    }
}
