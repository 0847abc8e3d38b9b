//! FIFO command buffering and ordered playback.
//!
//! [`CommandQueue`] buffers deferred callables produced by one thread
//! until a consumer executes them. It is deliberately unsynchronized —
//! the per-thread submit queues guard one with a plain mutex, and the
//! orchestrator composes one under its work-ready monitor for the
//! synchronized internal path. [`flush`](CommandQueue::flush) hands off
//! the filled buffer and leaves a fresh empty one, so producers are never
//! blocked by a consumer draining the previous batch.

use gantry_core::{AsyncOp, Command, CommandId};

/// Ordered FIFO of deferred commands.
#[derive(Default)]
pub struct CommandQueue {
    commands: Vec<Command>,
}

impl CommandQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fire-and-forget command.
    pub fn queue(&mut self, f: impl FnOnce() + Send + 'static) {
        self.commands.push(Command::plain(f));
    }

    /// Append a fire-and-forget command carrying a notification ID.
    pub fn queue_with_notify(&mut self, f: impl FnOnce() + Send + 'static, id: CommandId) {
        self.commands.push(Command::plain(f).with_notify(id));
    }

    /// Append a value-producing command, returning its result cell.
    pub fn queue_return(&mut self, f: impl FnOnce(&AsyncOp) + Send + 'static) -> AsyncOp {
        let (command, op) = Command::returning(f);
        self.commands.push(command);
        op
    }

    /// Append a value-producing command carrying a notification ID.
    pub fn queue_return_with_notify(
        &mut self,
        f: impl FnOnce(&AsyncOp) + Send + 'static,
        id: CommandId,
    ) -> AsyncOp {
        let (command, op) = Command::returning(f);
        self.commands.push(command.with_notify(id));
        op
    }

    /// Append an already-built command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Append a whole batch, preserving its order.
    pub fn append(&mut self, batch: Vec<Command>) {
        self.commands.extend(batch);
    }

    /// Whether the queue holds no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of buffered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Hand off the filled buffer, leaving a fresh empty one.
    pub fn flush(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

/// Counters produced by one playback pass, fed to the metrics sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Commands executed (including panicked ones).
    pub executed: usize,
    /// Value-producing commands that forgot to resolve their result and
    /// were resolved to the empty sentinel.
    pub auto_resolved: usize,
    /// Commands whose body panicked (contained, playback continued).
    pub panicked: usize,
}

/// Execute a batch in order, reporting completions as they happen.
///
/// `on_complete` is invoked with the command's ID after every command
/// that carries one — including commands whose body panicked, so a
/// blocked issuer always observes completion. A value-producing command
/// that never resolved its [`AsyncOp`] is resolved to the empty sentinel
/// and logged as a warning (see [`Command::run`]).
pub fn playback_with_notify(
    batch: Vec<Command>,
    mut on_complete: impl FnMut(CommandId),
) -> PlaybackStats {
    let mut stats = PlaybackStats::default();
    for command in batch {
        let outcome = command.run();
        stats.executed += 1;
        if outcome.auto_resolved {
            stats.auto_resolved += 1;
        }
        if outcome.panicked {
            stats.panicked += 1;
        }
        if let Some(id) = outcome.notify {
            on_complete(id);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn flush_hands_off_and_resets() {
        let mut queue = CommandQueue::new();
        queue.queue(|| {});
        queue.queue(|| {});
        assert_eq!(queue.len(), 2);

        let batch = queue.flush();
        assert_eq!(batch.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn playback_runs_in_submission_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut queue = CommandQueue::new();
        for i in 0..10 {
            let order = Arc::clone(&order);
            queue.queue(move || order.lock().unwrap().push(i));
        }

        let stats = playback_with_notify(queue.flush(), |_| {});
        assert_eq!(stats.executed, 10);
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn notify_fires_once_per_notifying_command() {
        let mut queue = CommandQueue::new();
        let first = CommandId::next();
        let second = CommandId::next();
        queue.queue_with_notify(|| {}, first);
        queue.queue(|| {});
        queue.queue_with_notify(|| {}, second);

        let mut completed = Vec::new();
        playback_with_notify(queue.flush(), |id| completed.push(id));
        assert_eq!(completed, vec![first, second]);
    }

    #[test]
    fn forgotten_resolve_is_counted_once() {
        let mut queue = CommandQueue::new();
        let resolved = queue.queue_return(|op| op.resolve(1u32));
        let forgotten = queue.queue_return(|_op| {});

        let stats = playback_with_notify(queue.flush(), |_| {});
        assert_eq!(stats.auto_resolved, 1);
        assert_eq!(resolved.take::<u32>(), Some(1));
        assert!(forgotten.is_resolved());
        assert_eq!(forgotten.take::<u32>(), None);
    }

    #[test]
    fn panicking_command_does_not_stop_playback() {
        let ran_after = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran_after);

        let mut queue = CommandQueue::new();
        let id = CommandId::next();
        queue.queue_with_notify(|| panic!("boom"), id);
        queue.queue(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut completed = Vec::new();
        let stats = playback_with_notify(queue.flush(), |id| completed.push(id));
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.executed, 2);
        // The panicking command still reported completion.
        assert_eq!(completed, vec![id]);
        assert_eq!(ran_after.load(Ordering::SeqCst), 1);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_interleaving_plays_back_in_order(
                returning in prop::collection::vec(any::<bool>(), 1..64),
            ) {
                let order = Arc::new(Mutex::new(Vec::new()));
                let mut queue = CommandQueue::new();
                for (i, is_returning) in returning.iter().enumerate() {
                    let order = Arc::clone(&order);
                    if *is_returning {
                        let _ = queue.queue_return(move |op| {
                            order.lock().unwrap().push(i);
                            op.resolve(i);
                        });
                    } else {
                        queue.queue(move || order.lock().unwrap().push(i));
                    }
                }

                let stats = playback_with_notify(queue.flush(), |_| {});
                prop_assert_eq!(stats.executed, returning.len());
                let seen = order.lock().unwrap().clone();
                prop_assert_eq!(seen, (0..returning.len()).collect::<Vec<_>>());
            }
        }
    }
}
