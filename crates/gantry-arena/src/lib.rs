//! Frame-scoped bump allocation for the gantry core-thread pipeline.
//!
//! Provides [`FrameAlloc`], a multi-block arena for transient per-frame
//! data that crosses from a producer thread into queued commands — the
//! backing bytes must stay alive until the core thread has consumed them,
//! which per-object deallocation cannot express cheaply. Reclamation is
//! wholesale: a [`FrameAlloc::mark_frame`] records a restore point and
//! [`FrameAlloc::clear`] rewinds to it.
//!
//! # Architecture
//!
//! ```text
//! FrameAlloc
//! ├── Block[]      contiguous byte buffers with bump cursors
//! ├── mark stack   explicit (block, cursor) restore points
//! └── debug ledger outstanding-byte leak check (debug builds only)
//! ```
//!
//! Allocations return a [`FrameRegion`] handle (block index + offset)
//! rather than a pointer; the bytes behind a handle are reached through
//! [`FrameAlloc::slice`] / [`FrameAlloc::slice_mut`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod block;
pub mod frame;

pub use block::Block;
pub use frame::{FrameAlloc, FrameRegion};
