//! # Errors
//!
//! Every public operation returns [`Result`]. Errors come in two families,
//! distinguished by their diagnostic prefix:
//!
//! - **library errors** (`thread library error: …`) are detected by the
//!   library itself. They are recoverable: the call is rejected and no
//!   scheduler state changes.
//! - **system errors** (`system error: …`) come from the underlying
//!   context/timer/signal primitives. Together with
//!   [`Error::ImpossibleState`] they are fatal and end the process through
//!   [`fatal`].

use thiserror::Error;

use crate::thread::Tid;

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// The error type for all thread library operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The id is out of range or no live thread currently owns it.
    #[error("thread library error: no thread with id {0}")]
    InvalidId(Tid),

    /// `spawn` would exceed `MAX_THREAD_NUM` live threads.
    #[error("thread library error: too many threads")]
    CapacityExceeded,

    /// The operation may not target (or be called by) the main thread.
    #[error("thread library error: illegal operation on the main thread")]
    MainThread,

    /// A non-positive quantum length or sleep duration.
    #[error("thread library error: invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// An operation was called before `init`.
    #[error("thread library error: library is not initialized")]
    NotInitialized,

    /// `init` was called a second time.
    #[error("thread library error: library is already initialized")]
    AlreadyInitialized,

    /// Scheduler bookkeeping contradicts itself.
    #[error("thread library error: impossible scheduling state: {0}")]
    ImpossibleState(&'static str),

    /// An underlying primitive (context, timer, signal) failed.
    #[error("system error: {op} failed: {source}")]
    System {
        /// The primitive that failed.
        op: &'static str,
        /// The errno it reported.
        #[source]
        source: nix::Error,
    },
}

impl Error {
    /// Wrap a primitive failure.
    pub(crate) fn system(op: &'static str, source: nix::Error) -> Self {
        Error::System { op, source }
    }

    /// Whether this error ends the process instead of being returned.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ImpossibleState(_) | Error::System { .. })
    }
}

/// Report a fatal error and end the process with a failure status.
pub fn fatal(err: Error) -> ! {
    log::error!("{err}");
    std::process::exit(1)
}

/// Return recoverable errors to the caller, abort on fatal ones.
pub(crate) fn escalate<T>(result: Result<T>) -> Result<T> {
    match result {
        Err(err) if err.is_fatal() => fatal(err),
        Err(err) => {
            log::warn!("{err}");
            Err(err)
        }
        ok => ok,
    }
}
