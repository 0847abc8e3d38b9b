//! Gantry: a sim-thread / core-thread command pipeline.
//!
//! Gantry decouples a simulation thread (application logic) from a single
//! dedicated core thread — the only thread permitted to execute queued
//! work, the way an engine reserves one thread for all device access.
//! Producers on any thread buffer deferred callables into per-thread
//! queues, submit batches to the core thread's synchronized internal
//! queue, and either fire-and-forget or block until specific commands
//! complete. Transient per-frame payloads live in a pair of alternating
//! frame arenas swapped by the application loop.
//!
//! This is the top-level facade crate re-exporting the public API from
//! the gantry sub-crates; for most users, adding `gantry` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use gantry::prelude::*;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! // Spawn the core thread; the current thread becomes the sim thread.
//! let core = CoreThread::start(CoreConfig::default()).unwrap();
//! let queue = core.get_queue().unwrap();
//!
//! // Buffer work locally — nothing reaches the core thread yet.
//! let counter = Arc::new(AtomicU32::new(0));
//! let seen = Arc::clone(&counter);
//! queue.queue_command(move || {
//!     seen.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! // Value-producing commands hand back a future-style result cell.
//! let answer = queue.queue_return_command(|op| op.resolve(6u32 * 7));
//!
//! // Mail the batch to the core thread and wait for it to drain.
//! queue.submit_to_core(true).unwrap();
//!
//! assert_eq!(counter.load(Ordering::SeqCst), 1);
//! assert_eq!(answer.take::<u32>(), Some(42));
//! core.shutdown();
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the
//! prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `gantry-core` | Commands, result cells, IDs, affinity errors |
//! | [`arena`] | `gantry-arena` | Frame allocator and region handles |
//! | [`engine`] | `gantry-engine` | Core thread, queues, config, metrics, global |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub use gantry_arena as arena;
pub use gantry_core as types;
pub use gantry_engine as engine;

/// The commonly used surface, re-exported flat.
pub mod prelude {
    pub use gantry_arena::{FrameAlloc, FrameRegion};
    pub use gantry_core::{AffinityError, AsyncOp, Command, CommandId};
    pub use gantry_engine::{
        CommandQueue, ConfigError, CoreConfig, CoreThread, MetricsSnapshot, ShutdownReport,
        SlotScheduler, SubmitError, SubmitQueue,
    };
}
