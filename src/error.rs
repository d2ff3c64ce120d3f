//! Error types for exit-handling configuration failures

use nix::sys::signal::Signal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExitError>;

/// Configuration errors are caller-fatal and never retried. Failures inside
/// registered callables are a separate concern: they are caught and logged by
/// the exit runner and never surface here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExitError {
    /// `install` was called a second time in the same process tree.
    #[error("exit handling is already installed in this process tree")]
    AlreadyInstalled,

    /// A requested signal is occupied by a handler this crate did not install.
    #[error("signal {} already has a foreign handler, refusing to override it", .0.as_str())]
    UnsupportedHandler(Signal),

    /// `register`/`unregister` called while the dispatcher is not bound to
    /// the termination signals of this process.
    #[error("exit handling is not installed in this process")]
    NotInstalled,

    /// An underlying sigaction/sigprocmask call failed.
    #[error("signal operation failed: {0}")]
    Signal(#[from] nix::Error),
}
