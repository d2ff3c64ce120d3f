//! Exit handling that works across a tree of forked worker processes.
//!
//! A single process-wide cleanup list cannot tell "this callable belongs to
//! this process" from "this callable is shared by the whole tree". Here each
//! process owns its own list, plus one shared list every descendant inherits
//! through fork. A termination signal or unhandled panic in any process runs
//! only that process's callables (last registered first), then the shared
//! ones, then terminates: the root exits orderly, a worker calls `_exit`.
//!
//! Call [`install`] once in the root before forking, then [`register`]
//! anywhere, any time. Unix only.

pub mod error;
mod identity;
pub mod install;
pub mod registry;
mod runner;
mod signals;

// Re-export the public surface
pub use error::{ExitError, Result};
pub use install::{install, install_with};
pub use nix::sys::signal::Signal;
pub use registry::{register, unregister, ExitRegistry};
pub use runner::run_exitfuncs;
