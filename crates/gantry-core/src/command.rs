//! Deferred command payloads and their execution outcomes.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::async_op::AsyncOp;
use crate::id::CommandId;

/// The callable carried by a command.
enum CommandKind {
    /// Fire-and-forget work.
    Plain(Box<dyn FnOnce() + Send>),
    /// Value-producing work. The callback receives the result cell it is
    /// expected to resolve; `op` is the queue-side copy of that cell.
    Returning {
        callback: Box<dyn FnOnce(&AsyncOp) + Send>,
        op: AsyncOp,
    },
}

/// A deferred unit of work, executed later by the core thread.
///
/// Commands move through *queued* → *executing* → *completed*. A command
/// optionally carries a [`CommandId`] used purely for completion
/// notification: after the command finishes, playback reports the ID so a
/// blocked issuer can return.
pub struct Command {
    kind: CommandKind,
    notify: Option<CommandId>,
}

/// What happened when a command ran.
///
/// Plays the receipt role for playback: the caller uses `notify` to fire
/// the completion protocol and the two flags to feed its metrics.
#[derive(Clone, Copy, Debug)]
pub struct CommandOutcome {
    /// The notification ID the command carried, if any.
    pub notify: Option<CommandId>,
    /// The command promised a result but never resolved it; playback
    /// resolved the cell to the empty sentinel on its behalf.
    pub auto_resolved: bool,
    /// The command body panicked. The panic was contained; any result
    /// cell was resolved empty so waiters still observe completion.
    pub panicked: bool,
}

impl Command {
    /// Create a fire-and-forget command.
    pub fn plain(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            kind: CommandKind::Plain(Box::new(f)),
            notify: None,
        }
    }

    /// Create a value-producing command.
    ///
    /// Returns the command and the issuer's copy of its result cell. The
    /// command body receives the same cell and is expected to call
    /// [`AsyncOp::resolve`] on it; forgetting to do so is tolerated (the
    /// cell resolves to the empty sentinel during execution, with a
    /// warning).
    pub fn returning(f: impl FnOnce(&AsyncOp) + Send + 'static) -> (Self, AsyncOp) {
        let op = AsyncOp::new();
        let command = Self {
            kind: CommandKind::Returning {
                callback: Box::new(f),
                op: op.clone(),
            },
            notify: None,
        };
        (command, op)
    }

    /// Attach a completion-notification ID.
    #[must_use]
    pub fn with_notify(mut self, id: CommandId) -> Self {
        self.notify = Some(id);
        self
    }

    /// The notification ID this command carries, if any.
    pub fn notify_id(&self) -> Option<CommandId> {
        self.notify
    }

    /// Execute the command body under a panic guard.
    ///
    /// A panicking body is contained: the panic is logged, the result cell
    /// (if any) is resolved empty, and the outcome still carries the
    /// notification ID so waiters are released. The calling thread never
    /// unwinds.
    pub fn run(self) -> CommandOutcome {
        let notify = self.notify;
        match self.kind {
            CommandKind::Plain(f) => {
                let panicked = catch_unwind(AssertUnwindSafe(f)).is_err();
                if panicked {
                    log::error!("queued command panicked; continuing playback");
                }
                CommandOutcome {
                    notify,
                    auto_resolved: false,
                    panicked,
                }
            }
            CommandKind::Returning { callback, op } => {
                let panicked = catch_unwind(AssertUnwindSafe(|| callback(&op))).is_err();
                if panicked {
                    log::error!("queued command panicked; continuing playback");
                }
                let mut auto_resolved = false;
                if !op.is_resolved() {
                    op.resolve_empty();
                    if !panicked {
                        log::warn!(
                            "command completed without resolving its result; \
                             resolved to the empty sentinel"
                        );
                        auto_resolved = true;
                    }
                }
                CommandOutcome {
                    notify,
                    auto_resolved,
                    panicked,
                }
            }
        }
    }

    /// Fail the command without executing it.
    ///
    /// Used during shutdown for commands that will never run: resolves the
    /// result cell (if any) to the empty sentinel and hands back the
    /// notification ID so the caller can release blocked waiters.
    pub fn fail(self) -> Option<CommandId> {
        if let CommandKind::Returning { op, .. } = self.kind {
            op.resolve_empty();
        }
        self.notify
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            CommandKind::Plain(_) => "plain",
            CommandKind::Returning { .. } => "returning",
        };
        f.debug_struct("Command")
            .field("kind", &kind)
            .field("notify", &self.notify)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn plain_command_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let outcome = Command::plain(move || flag.store(true, Ordering::SeqCst)).run();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(outcome.notify, None);
        assert!(!outcome.auto_resolved);
        assert!(!outcome.panicked);
    }

    #[test]
    fn returning_command_resolves_its_cell() {
        let (command, op) = Command::returning(|op| op.resolve(9u32));
        let outcome = command.run();
        assert!(!outcome.auto_resolved);
        assert_eq!(op.take::<u32>(), Some(9));
    }

    #[test]
    fn forgotten_resolve_becomes_empty_sentinel() {
        let (command, op) = Command::returning(|_op| {});
        let outcome = command.run();
        assert!(outcome.auto_resolved);
        assert!(op.is_resolved());
        assert_eq!(op.take::<u32>(), None);
    }

    #[test]
    fn notify_id_survives_execution() {
        let id = CommandId::next();
        let outcome = Command::plain(|| {}).with_notify(id).run();
        assert_eq!(outcome.notify, Some(id));
    }

    #[test]
    fn panicking_body_is_contained() {
        let (command, op) = Command::returning(|_op| panic!("boom"));
        let outcome = command.run();
        assert!(outcome.panicked);
        assert!(!outcome.auto_resolved);
        // Waiters still observe completion.
        assert!(op.is_resolved());
    }

    #[test]
    fn fail_resolves_without_running() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let (command, op) = Command::returning(move |_op| flag.store(true, Ordering::SeqCst));
        let id = CommandId::next();
        let notify = command.with_notify(id).fail();
        assert_eq!(notify, Some(id));
        assert!(op.is_resolved());
        assert!(!ran.load(Ordering::SeqCst));
    }
}
