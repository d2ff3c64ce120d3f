//! Signal/panic dispatch and the exit runner

use crate::identity::Identity;
use crate::install;
use crate::registry;
use crate::signals;
use nix::sys::signal::Signal;
use nix::unistd::getpid;
use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};

/// Set for the lifetime of an exit run. Together with the signal mask this
/// keeps a late trigger from re-entering the runner.
static RUNNING: AtomicBool = AtomicBool::new(false);

/// Signal-path entry point, bound by `install` via sigaction.
pub(crate) extern "C" fn dispatch(signum: libc::c_int) {
    let name = Signal::try_from(signum)
        .map(Signal::as_str)
        .unwrap_or("unknown");

    let identity = Identity::current();
    tracing::debug!(
        process = %identity.name,
        pid = %identity.pid,
        path = %identity.path_string(),
        signal = name,
        "got termination signal"
    );

    run_exitfuncs(signum);
}

/// Panic-path entry point, installed as the process panic hook by `install`.
///
/// A panic raised by a cleanup callable while the runner is active must
/// unwind back into the runner's `catch_unwind`, not trigger a second run,
/// so in that case only the saved hook is invoked.
pub(crate) fn panic_dispatch(
    info: &PanicHookInfo<'_>,
    previous: &(dyn Fn(&PanicHookInfo<'_>) + Send + Sync),
) {
    if RUNNING.load(Ordering::SeqCst) {
        previous(info);
        return;
    }

    let identity = Identity::current();
    tracing::error!(
        process = %identity.name,
        pid = %identity.pid,
        path = %identity.path_string(),
        panic = %info,
        "unhandled panic, running exit callables"
    );

    previous(info);
    run_exitfuncs(1);
}

/// Run this process's exit callables and terminate. Never returns.
///
/// Owned callables run first, last registered first, then shared callables in
/// the same reverse order. Each invocation is isolated: a panicking callable
/// is logged and does not stop the rest of the batch or change the exit code.
///
/// The root process then exits through the normal shutdown machinery with
/// `code`; any other process terminates immediately via `_exit` — a worker
/// going through normal shutdown could re-trigger cleanup semantics or block
/// on resources only the parent can release.
pub fn run_exitfuncs(code: i32) -> ! {
    RUNNING.store(true, Ordering::SeqCst);

    let (bound, is_root) = {
        let state = install::lock_state();
        match state.as_ref() {
            Some(s) => (s.bound.clone(), s.root == getpid()),
            // Manual invocation without install: nothing bound, exit orderly.
            None => (Vec::new(), true),
        }
    };

    // Mask re-delivery of the bound signals for the rest of this process.
    if let Err(err) = signals::block(&bound) {
        tracing::warn!(error = %err, "failed to mask signals during exit run");
    }

    // Snapshot under the lock; the lock is never held across an invocation.
    let (own, shared) = registry::lock_registry().batch_for(getpid());

    let identity = Identity::current();
    for func in own {
        invoke(&identity, func, "own");
    }
    for func in shared {
        invoke(&identity, func, "shared");
    }

    if is_root {
        tracing::debug!(
            process = %identity.name,
            pid = %identity.pid,
            path = %identity.path_string(),
            code,
            "root process exit"
        );
        std::process::exit(code);
    }

    tracing::debug!(
        process = %identity.name,
        pid = %identity.pid,
        path = %identity.path_string(),
        code,
        "worker immediate termination"
    );
    unsafe { libc::_exit(code) }
}

fn invoke(identity: &Identity, func: fn(), scope: &str) {
    tracing::debug!(
        process = %identity.name,
        pid = %identity.pid,
        path = %identity.path_string(),
        scope,
        "running exit callable"
    );

    // Every failure is logged, not just the last one in the batch.
    if panic::catch_unwind(func).is_err() {
        tracing::error!(
            process = %identity.name,
            pid = %identity.pid,
            path = %identity.path_string(),
            scope,
            "exit callable panicked, continuing with the rest"
        );
    }
}
