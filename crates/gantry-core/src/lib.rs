//! Command and result primitives for the gantry core-thread pipeline.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! deferred [`Command`] payload executed by the core thread, the
//! [`AsyncOp`] result cell shared between a command's issuer and the
//! thread that eventually runs it, the [`CommandId`] used by the
//! completion-notification protocol, and the thread-affinity error type.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod async_op;
pub mod command;
pub mod error;
pub mod id;

pub use async_op::AsyncOp;
pub use command::{Command, CommandOutcome};
pub use error::AffinityError;
pub use id::CommandId;
