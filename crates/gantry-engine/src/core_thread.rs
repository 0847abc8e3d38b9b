//! The core-thread orchestrator.
//!
//! [`CoreThread`] owns the single dedicated worker thread that executes
//! queued commands, mediates all cross-thread submission, and owns the
//! two alternating frame allocators producers stash per-command payload
//! data in. The constructing thread becomes the *sim thread*; any other
//! thread may produce commands through its own [`SubmitQueue`].
//!
//! Three independent guards back the orchestrator: the work-ready monitor
//! around the internal queue, the completion monitor around the
//! completed-ID board, and the registry mutex around the per-thread queue
//! map. The worker never holds any of them while executing commands.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use indexmap::IndexMap;
use smallvec::SmallVec;

use gantry_arena::FrameAlloc;
use gantry_core::{AffinityError, AsyncOp, Command, CommandId};

use crate::config::{ConfigError, CoreConfig, SlotScheduler};
use crate::metrics::{CoreMetrics, MetricsSnapshot};
use crate::monitor::Monitor;
use crate::queue::{playback_with_notify, CommandQueue};
use crate::submitter::SubmitQueue;

// ── Error types ──────────────────────────────────────────────────

/// Error submitting commands to the core thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitError {
    /// The core thread has shut down; the commands were failed instead of
    /// queued (result cells resolved to the empty sentinel).
    Shutdown,
    /// The call came from the core thread itself. The core thread
    /// executes commands, it does not enqueue into itself — this is a bug
    /// at the call site.
    FromCoreThread,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => write!(f, "core thread has shut down"),
            Self::FromCoreThread => {
                write!(f, "cannot queue onto the core thread from the core thread")
            }
        }
    }
}

impl Error for SubmitError {}

// ── ShutdownReport ───────────────────────────────────────────────

/// Report from the shutdown sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Whether the worker thread was joined successfully.
    pub worker_joined: bool,
    /// Commands that were still queued when the worker exited; each was
    /// failed (result cell resolved empty, notification delivered) rather
    /// than executed.
    pub failed_commands: usize,
}

// ── Shared state ─────────────────────────────────────────────────

/// Handle to one of the two alternating frame allocators.
///
/// The mutex is a soundness requirement of handing the allocator across
/// threads, not a contention point: the [`CoreThread::update`] handoff
/// discipline gives each arena a single user at a time.
pub type SharedFrameAlloc = Arc<Mutex<FrameAlloc>>;

/// The internal synchronized queue plus the shutdown flag, guarded by the
/// work-ready monitor.
struct InternalQueue {
    queue: CommandQueue,
    shutdown: bool,
}

/// Completed notification IDs awaiting pickup by their blocked issuers.
///
/// One condvar pulse serves every waiter; each scans for its own ID and
/// removes it, trading a per-command condvar for a linear scan over the
/// (expected small) set of concurrently outstanding notifications.
struct CompletionBoard {
    completed: SmallVec<[CommandId; 8]>,
}

impl CompletionBoard {
    fn new() -> Self {
        Self {
            completed: SmallVec::new(),
        }
    }

    fn complete(&mut self, id: CommandId) {
        self.completed.push(id);
    }

    /// Remove `id` from the board if present. Each completion is
    /// delivered to exactly one waiter.
    fn take(&mut self, id: CommandId) -> bool {
        match self.completed.iter().position(|&c| c == id) {
            Some(index) => {
                self.completed.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

/// State shared between the orchestrator, its worker thread, and every
/// [`SubmitQueue`] handle.
pub(crate) struct CoreShared {
    internal: Monitor<InternalQueue>,
    completion: Monitor<CompletionBoard>,
    /// Startup handshake: the worker publishes its identity here.
    identity: Monitor<Option<ThreadId>>,
    core_id: OnceLock<ThreadId>,
    /// Per-thread queues in registration order.
    registry: Mutex<IndexMap<ThreadId, SubmitQueue>>,
    metrics: CoreMetrics,
    scheduler: Option<Arc<dyn SlotScheduler>>,
}

impl CoreShared {
    fn new(scheduler: Option<Arc<dyn SlotScheduler>>) -> Self {
        Self {
            internal: Monitor::new(InternalQueue {
                queue: CommandQueue::new(),
                shutdown: false,
            }),
            completion: Monitor::new(CompletionBoard::new()),
            identity: Monitor::new(None),
            core_id: OnceLock::new(),
            registry: Mutex::new(IndexMap::new()),
            metrics: CoreMetrics::default(),
            scheduler,
        }
    }

    fn is_core_thread(&self, id: ThreadId) -> bool {
        self.core_id.get() == Some(&id)
    }

    fn is_shut_down(&self) -> bool {
        self.internal.with(|q| q.shutdown)
    }

    /// Append a batch to the internal queue and wake the worker.
    ///
    /// With `block` set, a no-op fence command carrying a fresh
    /// notification ID is appended under the same lock; FIFO order makes
    /// the fence's completion imply the whole batch has drained, and the
    /// caller waits for it. After shutdown the batch is failed instead.
    pub(crate) fn push_commands(
        &self,
        batch: Vec<Command>,
        block: bool,
    ) -> Result<(), SubmitError> {
        if batch.is_empty() && !block {
            return Ok(());
        }
        let fence = if block { Some(CommandId::next()) } else { None };

        let rejected = self.internal.signal(move |q| {
            if q.shutdown {
                Some(batch)
            } else {
                q.queue.append(batch);
                if let Some(id) = fence {
                    q.queue.push(Command::plain(|| {}).with_notify(id));
                }
                None
            }
        });

        if let Some(batch) = rejected {
            self.fail_commands(batch);
            return Err(SubmitError::Shutdown);
        }
        if let Some(id) = fence {
            self.wait_for_completion(id);
        }
        Ok(())
    }

    /// Fail commands that will never run: resolve their result cells and
    /// deliver their completion notifications so no waiter hangs.
    fn fail_commands(&self, batch: Vec<Command>) {
        for command in batch {
            if let Some(id) = command.fail() {
                self.completion.signal(|board| board.complete(id));
            }
        }
    }

    /// Block until `id` appears on the completion board, removing it.
    fn wait_for_completion(&self, id: CommandId) {
        self.completion
            .wait_until(|board| board.take(id).then_some(()));
    }

    /// Worker-side completion delivery.
    fn notify_complete(&self, id: CommandId) {
        self.completion.signal(|board| board.complete(id));
        self.metrics.notifications.fetch_add(1, Ordering::Relaxed);
    }
}

// ── Worker loop ──────────────────────────────────────────────────

/// Idle → Draining → Idle, until the shutdown flag is observed.
///
/// The flush happens under the work-ready lock; playback happens outside
/// it, so producers are never blocked by command execution. On shutdown
/// the loop terminates without draining further — the orchestrator fails
/// whatever is left.
fn worker_loop(shared: Arc<CoreShared>) {
    let id = thread::current().id();
    let _ = shared.core_id.set(id);
    shared.identity.signal(|slot| *slot = Some(id));

    loop {
        let idle = shared
            .internal
            .with(|q| q.queue.is_empty() && !q.shutdown);
        if idle {
            if let Some(scheduler) = &shared.scheduler {
                scheduler.release_slot();
            }
            shared
                .internal
                .wait_until(|q| (!q.queue.is_empty() || q.shutdown).then_some(()));
            if let Some(scheduler) = &shared.scheduler {
                scheduler.reclaim_slot();
            }
        }

        let batch = shared.internal.with(|q| {
            if q.shutdown {
                None
            } else {
                Some(q.queue.flush())
            }
        });
        let Some(batch) = batch else { break };
        if batch.is_empty() {
            continue;
        }

        let stats = playback_with_notify(batch, |id| shared.notify_complete(id));
        shared.metrics.record_playback(&stats);
    }
}

// ── CoreThread ───────────────────────────────────────────────────

/// Orchestrator for the sim-thread / core-thread split.
///
/// Constructed on the sim thread; spawns the dedicated core thread and
/// blocks until it has taken on its identity. All submission flows
/// through here: per-thread queues via [`get_queue`](CoreThread::get_queue)
/// and [`submit`](CoreThread::submit)/[`submit_all`](CoreThread::submit_all),
/// or the direct internal path via
/// [`queue_command`](CoreThread::queue_command) for control operations
/// that must be ordered precisely.
pub struct CoreThread {
    shared: Arc<CoreShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    sim_thread: ThreadId,
    frames: [SharedFrameAlloc; 2],
    active_frame: AtomicUsize,
}

impl std::fmt::Debug for CoreThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreThread")
            .field("sim_thread", &self.sim_thread)
            .field("active_frame", &self.active_frame)
            .finish_non_exhaustive()
    }
}

impl CoreThread {
    /// Spawn the core thread and wait for it to come up.
    pub fn start(config: CoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sim_thread = thread::current().id();

        let shared = Arc::new(CoreShared::new(config.scheduler.clone()));
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker_loop(worker_shared))
            .expect("failed to spawn core thread");

        // Block until the worker has published its identity.
        shared.identity.wait_until(|slot| *slot);

        let new_frame = || {
            let mut frame = FrameAlloc::new(config.frame_block_size);
            frame.set_owner_thread(sim_thread);
            Arc::new(Mutex::new(frame))
        };

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
            sim_thread,
            frames: [new_frame(), new_frame()],
            active_frame: AtomicUsize::new(0),
        })
    }

    /// The calling thread's submit queue, created on first use.
    ///
    /// Repeat calls from the same OS thread return the same handle;
    /// distinct threads get distinct handles, all of which
    /// [`submit_all`](CoreThread::submit_all) can discover. Invalid from
    /// the core thread itself.
    pub fn get_queue(&self) -> Result<SubmitQueue, SubmitError> {
        let current = thread::current().id();
        if self.shared.is_core_thread(current) {
            return Err(SubmitError::FromCoreThread);
        }
        if self.shared.is_shut_down() {
            return Err(SubmitError::Shutdown);
        }
        let mut registry = self.shared.registry.lock().unwrap();
        let queue = registry.entry(current).or_insert_with(|| {
            SubmitQueue::new(
                current,
                current == self.sim_thread,
                Arc::downgrade(&self.shared),
            )
        });
        Ok(queue.clone())
    }

    /// Submit the calling thread's queue to the core thread.
    ///
    /// With `block` set, returns only after the entire just-submitted
    /// batch has executed.
    pub fn submit(&self, block: bool) -> Result<(), SubmitError> {
        self.get_queue()?.submit_to_core(block)
    }

    /// Submit every registered per-thread queue.
    ///
    /// Worker-thread queues are submitted before the sim thread's queue,
    /// so worker-submitted work is visible to the core thread first. The
    /// registry is snapshotted under its lock and iterated unlocked, so
    /// producers registering concurrently are not blocked.
    pub fn submit_all(&self, block: bool) -> Result<(), SubmitError> {
        if self.shared.is_core_thread(thread::current().id()) {
            return Err(SubmitError::FromCoreThread);
        }
        if self.shared.is_shut_down() {
            return Err(SubmitError::Shutdown);
        }
        let queues: Vec<SubmitQueue> = self
            .shared
            .registry
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();

        for queue in queues.iter().filter(|q| !q.is_sim_thread()) {
            queue.submit_to_core(false)?;
        }
        for queue in queues.iter().filter(|q| q.is_sim_thread()) {
            queue.submit_to_core(false)?;
        }
        if block {
            self.shared.push_commands(Vec::new(), true)?;
        }
        Ok(())
    }

    /// Queue a command directly onto the internal synchronized queue.
    ///
    /// Bypasses the per-thread queues; used for control operations that
    /// must be ordered precisely and optionally awaited synchronously.
    pub fn queue_command(
        &self,
        f: impl FnOnce() + Send + 'static,
        block: bool,
    ) -> Result<(), SubmitError> {
        if self.shared.is_core_thread(thread::current().id()) {
            return Err(SubmitError::FromCoreThread);
        }
        self.shared.push_commands(vec![Command::plain(f)], block)
    }

    /// Queue a value-producing command directly onto the internal queue.
    pub fn queue_return_command(
        &self,
        f: impl FnOnce(&AsyncOp) + Send + 'static,
        block: bool,
    ) -> Result<AsyncOp, SubmitError> {
        if self.shared.is_core_thread(thread::current().id()) {
            return Err(SubmitError::FromCoreThread);
        }
        let (command, op) = Command::returning(f);
        self.shared.push_commands(vec![command], block)?;
        Ok(op)
    }

    /// Per-frame maintenance, called once per simulation frame by the
    /// owning application loop on the sim thread.
    ///
    /// Hands both frame allocators to the core thread (which may now read
    /// everything allocated during the frame about to be submitted),
    /// swaps the pair, clears the newly active arena, and hands it back
    /// to the sim thread for the frame about to be written.
    pub fn update(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.sim_thread,
            "update() must be called from the sim thread"
        );
        let core = self.core_thread_id();
        for frame in &self.frames {
            frame.lock().unwrap().set_owner_thread(core);
        }

        let next = self.active_frame.load(Ordering::Acquire) ^ 1;
        self.active_frame.store(next, Ordering::Release);

        let mut active = self.frames[next].lock().unwrap();
        active.clear();
        active.set_owner_thread(self.sim_thread);
    }

    /// The currently active (write-side) frame allocator.
    ///
    /// For callers who need to stash per-command payload data that must
    /// outlive the call stack until the core thread consumes it. The
    /// returned handle stays valid across [`update`](CoreThread::update);
    /// capture it together with the region into the queued command so the
    /// consumer can read and free the bytes.
    pub fn frame_alloc(&self) -> SharedFrameAlloc {
        Arc::clone(&self.frames[self.active_frame.load(Ordering::Acquire)])
    }

    /// The core thread's identity.
    pub fn core_thread_id(&self) -> ThreadId {
        *self
            .shared
            .core_id
            .get()
            .expect("core thread identity is published before start() returns")
    }

    /// The sim thread's identity (the thread that called
    /// [`start`](CoreThread::start)).
    pub fn sim_thread_id(&self) -> ThreadId {
        self.sim_thread
    }

    /// Error unless called from the core thread.
    ///
    /// Used pervasively by resource code to enforce "only the core thread
    /// touches the device" invariants.
    pub fn ensure_core_thread(&self) -> Result<(), AffinityError> {
        let current = thread::current().id();
        let core = self.core_thread_id();
        if current == core {
            Ok(())
        } else {
            Err(AffinityError::NotCoreThread {
                expected: core,
                actual: current,
            })
        }
    }

    /// Error if called from the core thread.
    pub fn ensure_not_core_thread(&self) -> Result<(), AffinityError> {
        let current = thread::current().id();
        if current == self.core_thread_id() {
            Err(AffinityError::IsCoreThread { thread: current })
        } else {
            Ok(())
        }
    }

    /// Point-in-time copy of the execution counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Stop the worker and fail whatever never ran.
    ///
    /// Idempotent: the first call sets the shutdown flag, wakes and joins
    /// the worker, then fails still-queued commands (result cells resolve
    /// empty, notifications are delivered) so no waiter is left hanging.
    /// Subsequent calls report no work.
    pub fn shutdown(&self) -> ShutdownReport {
        let handle = self.worker.lock().unwrap().take();
        let Some(handle) = handle else {
            return ShutdownReport {
                worker_joined: true,
                failed_commands: 0,
            };
        };

        self.shared.internal.signal(|q| q.shutdown = true);
        let worker_joined = handle.join().is_ok();

        let leftovers = self.shared.internal.with(|q| q.queue.flush());
        let failed_commands = leftovers.len();
        self.shared.fail_commands(leftovers);
        self.shared.registry.lock().unwrap().clear();

        ShutdownReport {
            worker_joined,
            failed_commands,
        }
    }
}

impl Drop for CoreThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn start_core() -> CoreThread {
        CoreThread::start(CoreConfig {
            frame_block_size: 1024,
            ..CoreConfig::default()
        })
        .unwrap()
    }

    // ── CompletionBoard ──────────────────────────────────────────

    #[test]
    fn completion_is_delivered_exactly_once() {
        let mut board = CompletionBoard::new();
        let id = CommandId::next();
        board.complete(id);
        assert!(board.take(id));
        assert!(!board.take(id));
    }

    #[test]
    fn completion_board_keeps_other_ids() {
        let mut board = CompletionBoard::new();
        let a = CommandId::next();
        let b = CommandId::next();
        board.complete(a);
        board.complete(b);
        assert!(board.take(a));
        assert!(board.take(b));
    }

    // ── Lifecycle ────────────────────────────────────────────────

    #[test]
    fn start_publishes_distinct_identities() {
        let core = start_core();
        assert_ne!(core.core_thread_id(), core.sim_thread_id());
        assert_eq!(core.sim_thread_id(), thread::current().id());
        core.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let core = start_core();
        let first = core.shutdown();
        assert!(first.worker_joined);
        let second = core.shutdown();
        assert_eq!(second.failed_commands, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = CoreConfig {
            frame_block_size: 0,
            ..CoreConfig::default()
        };
        assert!(matches!(
            CoreThread::start(config),
            Err(ConfigError::InvalidBlockSize { .. })
        ));
    }

    // ── Direct internal queue ────────────────────────────────────

    #[test]
    fn blocking_queue_command_observes_side_effects() {
        let core = start_core();
        let counter = Arc::new(AtomicU32::new(0));

        let seen = Arc::clone(&counter);
        core.queue_command(
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            true,
        )
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        core.shutdown();
    }

    #[test]
    fn blocking_return_command_is_resolved_on_return() {
        let core = start_core();
        let op = core
            .queue_return_command(|op| op.resolve(6u32 * 7), true)
            .unwrap();
        assert!(op.is_resolved());
        assert_eq!(op.take::<u32>(), Some(42));
        core.shutdown();
    }

    #[test]
    fn non_blocking_return_command_resolves_eventually() {
        let core = start_core();
        let op = core
            .queue_return_command(|op| op.resolve(String::from("done")), false)
            .unwrap();
        op.wait();
        assert_eq!(op.take::<String>(), Some(String::from("done")));
        core.shutdown();
    }

    #[test]
    fn commands_after_shutdown_are_failed() {
        let core = start_core();
        core.shutdown();

        let result = core.queue_command(|| {}, false);
        assert_eq!(result, Err(SubmitError::Shutdown));

        let err = core
            .queue_return_command(|op| op.resolve(1u32), false)
            .unwrap_err();
        assert_eq!(err, SubmitError::Shutdown);
    }

    // ── Per-thread queues ────────────────────────────────────────

    #[test]
    fn get_queue_is_cached_per_thread() {
        let core = start_core();
        let first = core.get_queue().unwrap();
        let second = core.get_queue().unwrap();
        assert_eq!(first.thread_id(), second.thread_id());
        assert!(first.is_sim_thread());
        core.shutdown();
    }

    #[test]
    fn submit_flushes_the_calling_threads_queue() {
        let core = start_core();
        let counter = Arc::new(AtomicU32::new(0));

        let queue = core.get_queue().unwrap();
        for _ in 0..3 {
            let seen = Arc::clone(&counter);
            queue.queue_command(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0, "not yet submitted");

        core.submit(true).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        core.shutdown();
    }

    // ── Frame allocators ─────────────────────────────────────────

    #[test]
    fn update_swaps_and_clears() {
        let core = start_core();

        let frame = core.frame_alloc();
        let region = frame.lock().unwrap().alloc(100);
        assert_eq!(frame.lock().unwrap().used_bytes(), 100);

        core.update();
        // The previous frame's bytes survive the swap for the consumer.
        assert_eq!(frame.lock().unwrap().used_bytes(), 100);
        let other = core.frame_alloc();
        assert!(!Arc::ptr_eq(&frame, &other));

        // Consumer side reads and releases the payload.
        frame.lock().unwrap().free(region);

        core.update();
        // Back to the first arena, now cleared for the new frame.
        let active = core.frame_alloc();
        assert!(Arc::ptr_eq(&frame, &active));
        assert_eq!(active.lock().unwrap().used_bytes(), 0);
        core.shutdown();
    }

    #[test]
    fn update_retags_owners_for_the_handoff() {
        let core = start_core();
        let frame = core.frame_alloc();
        assert_eq!(
            frame.lock().unwrap().owner_thread(),
            Some(core.sim_thread_id())
        );

        core.update();
        // The retired arena now belongs to the core thread.
        assert_eq!(
            frame.lock().unwrap().owner_thread(),
            Some(core.core_thread_id())
        );
        // The active arena belongs to the sim thread again.
        let active = core.frame_alloc();
        assert_eq!(
            active.lock().unwrap().owner_thread(),
            Some(core.sim_thread_id())
        );
        core.shutdown();
    }

    // ── Scheduler hook ───────────────────────────────────────────

    struct CountingScheduler {
        released: AtomicU32,
        reclaimed: AtomicU32,
    }

    impl SlotScheduler for CountingScheduler {
        fn release_slot(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
        fn reclaim_slot(&self) {
            self.reclaimed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn idle_worker_donates_and_reclaims_its_slot() {
        let scheduler = Arc::new(CountingScheduler {
            released: AtomicU32::new(0),
            reclaimed: AtomicU32::new(0),
        });
        let core = CoreThread::start(CoreConfig {
            frame_block_size: 1024,
            scheduler: Some(Arc::clone(&scheduler) as Arc<dyn SlotScheduler>),
            ..CoreConfig::default()
        })
        .unwrap();

        // Give the worker a chance to reach its idle wait, then wake it.
        thread::sleep(Duration::from_millis(20));
        core.queue_command(|| {}, true).unwrap();
        core.shutdown();

        let released = scheduler.released.load(Ordering::SeqCst);
        let reclaimed = scheduler.reclaimed.load(Ordering::SeqCst);
        assert!(released >= 1);
        assert_eq!(released, reclaimed, "every donation is reclaimed");
    }
}
