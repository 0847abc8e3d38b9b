//! Optional process-wide core thread instance.
//!
//! Engines that want one engine-wide core thread use this explicit
//! lifecycle instead of scattering their own statics:
//! [`initialize`] at application start, [`instance`] to hand the `Arc` to
//! collaborators (pass it along rather than re-resolving the global at
//! every call site), [`shutdown`] at application exit. Code that does not
//! need process-wide access should construct
//! [`CoreThread`](crate::CoreThread) directly — everything else in this
//! crate works without this module.

use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::config::{ConfigError, CoreConfig};
use crate::core_thread::{CoreThread, ShutdownReport};

static INSTANCE: Mutex<Option<Arc<CoreThread>>> = Mutex::new(None);

/// Errors from the process-global lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GlobalError {
    /// [`initialize`] was called while an instance already exists.
    AlreadyInitialized,
    /// [`instance`] or [`shutdown`] was called before [`initialize`].
    NotInitialized,
    /// The provided configuration failed validation.
    Config(ConfigError),
}

impl fmt::Display for GlobalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "global core thread already initialized"),
            Self::NotInitialized => write!(f, "global core thread not initialized"),
            Self::Config(err) => write!(f, "invalid core thread config: {err}"),
        }
    }
}

impl Error for GlobalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for GlobalError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

/// Start the process-wide core thread.
///
/// The calling thread becomes the sim thread. Returns the instance so the
/// caller can pass it to collaborators directly.
pub fn initialize(config: CoreConfig) -> Result<Arc<CoreThread>, GlobalError> {
    let mut slot = INSTANCE.lock().unwrap();
    if slot.is_some() {
        return Err(GlobalError::AlreadyInitialized);
    }
    let core = Arc::new(CoreThread::start(config)?);
    *slot = Some(Arc::clone(&core));
    Ok(core)
}

/// The process-wide core thread.
pub fn instance() -> Result<Arc<CoreThread>, GlobalError> {
    INSTANCE
        .lock()
        .unwrap()
        .as_ref()
        .cloned()
        .ok_or(GlobalError::NotInitialized)
}

/// Stop and release the process-wide core thread.
///
/// Outstanding `Arc`s held by collaborators stay valid but observe the
/// shut-down state (submissions fail with
/// [`SubmitError::Shutdown`](crate::SubmitError::Shutdown)).
pub fn shutdown() -> Result<ShutdownReport, GlobalError> {
    let core = INSTANCE
        .lock()
        .unwrap()
        .take()
        .ok_or(GlobalError::NotInitialized)?;
    Ok(core.shutdown())
}
