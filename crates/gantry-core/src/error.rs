//! Thread-affinity error types.

use std::error::Error;
use std::fmt;
use std::thread::ThreadId;

/// Errors raised by thread-identity assertions.
///
/// These are usage errors: they indicate a bug at the call site, not a
/// runtime condition, and there is nothing sensible to recover to. Callers
/// typically propagate them straight up to whatever aborts the offending
/// operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AffinityError {
    /// An operation restricted to the core thread was invoked elsewhere.
    NotCoreThread {
        /// The core thread's identity.
        expected: ThreadId,
        /// The thread the call actually came from.
        actual: ThreadId,
    },
    /// An operation forbidden on the core thread was invoked on it.
    IsCoreThread {
        /// The offending thread (the core thread itself).
        thread: ThreadId,
    },
}

impl fmt::Display for AffinityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCoreThread { expected, actual } => write!(
                f,
                "operation requires the core thread ({expected:?}), called from {actual:?}"
            ),
            Self::IsCoreThread { thread } => write!(
                f,
                "operation is forbidden on the core thread ({thread:?})"
            ),
        }
    }
}

impl Error for AffinityError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn display_mentions_both_threads() {
        let here = thread::current().id();
        let err = AffinityError::NotCoreThread {
            expected: here,
            actual: here,
        };
        let text = err.to_string();
        assert!(text.contains("requires the core thread"));
    }
}
