//! Core-thread orchestrator and command queues for the gantry pipeline.
//!
//! Producers on any thread buffer deferred work into per-thread
//! [`SubmitQueue`]s; batches are submitted to one synchronized internal
//! queue; a single dedicated core thread drains and executes them in FIFO
//! order, with optional blocking completion and future-style results.
//!
//! # Architecture
//!
//! ```text
//! Producer Thread(s)            Core Thread
//!     |                             |
//!     |--get_queue()                |
//!     |--queue_command()   (buffered locally, no synchronization cost)
//!     |--submit(block)----------->  | internal queue monitor wakes
//!     |   [batch + fence]           | flush under lock
//!     |                             | playback in FIFO order
//!     |   blocks on completion      | completion monitor: complete(id)
//!     |<--fence id completed--------|
//!     |                             | back to idle wait
//! ```
//!
//! The three synchronization points — work-ready, command-completed, and
//! the per-thread queue registry — are separate guards; none is ever held
//! across command execution.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod core_thread;
pub mod global;
pub mod metrics;
pub mod monitor;
pub mod queue;
pub mod submitter;

pub use config::{ConfigError, CoreConfig, SlotScheduler};
pub use core_thread::{CoreThread, SharedFrameAlloc, ShutdownReport, SubmitError};
pub use global::GlobalError;
pub use metrics::MetricsSnapshot;
pub use monitor::Monitor;
pub use queue::{playback_with_notify, CommandQueue, PlaybackStats};
pub use submitter::SubmitQueue;
