//! One-time installation of the signal dispatcher and panic hook

use crate::error::{ExitError, Result};
use crate::identity::Identity;
use crate::runner;
use crate::signals::{self, Disposition};
use nix::sys::signal::Signal;
use nix::unistd::{getpid, Pid};
use once_cell::sync::Lazy;
use std::sync::{Mutex, MutexGuard};

/// Facts captured by the first successful `install`; read-only afterwards.
/// A forked worker inherits this snapshot, which is what makes the root pid
/// a tree-wide marker.
pub(crate) struct InstallState {
    pub root: Pid,
    pub bound: Vec<Signal>,
    /// Dispositions each bound signal had before install replaced them;
    /// part of the snapshot workers inherit, surfaced in the install record.
    pub saved: Vec<(Signal, Disposition)>,
}

pub(crate) static STATE: Lazy<Mutex<Option<InstallState>>> = Lazy::new(|| Mutex::new(None));

pub(crate) fn lock_state() -> MutexGuard<'static, Option<InstallState>> {
    STATE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install the dispatcher for `SIGTERM` with the panic hook enabled.
///
/// Call once, in the root process, before forking any worker that needs to
/// register cleanup.
pub fn install() -> Result<()> {
    install_with(&[Signal::SIGTERM], true)
}

/// Install the dispatcher for an explicit signal set.
///
/// An empty slice means the default set (`SIGTERM`). With `panic_hook`, the
/// previous panic hook is saved and wrapped so an unhandled panic also runs
/// the exit callables, then terminates with exit code 1.
///
/// Fails with [`ExitError::AlreadyInstalled`] on a second call anywhere in
/// the tree, and with [`ExitError::UnsupportedHandler`] if any requested
/// signal is occupied by a handler this crate did not install; in both cases
/// no disposition is touched.
pub fn install_with(signals_requested: &[Signal], panic_hook: bool) -> Result<()> {
    let requested = normalize(signals_requested);

    let mut state = lock_state();
    if state.is_some() {
        return Err(ExitError::AlreadyInstalled);
    }

    // Validate every requested signal before touching any disposition.
    let mut saved = Vec::with_capacity(requested.len());
    for sig in &requested {
        match signals::query(*sig, runner::dispatch)? {
            d @ (Disposition::Default | Disposition::Ignore) => saved.push((*sig, d)),
            _ => return Err(ExitError::UnsupportedHandler(*sig)),
        }
    }

    // Bind the dispatcher; roll back already-bound signals if a bind fails.
    let mut bound: Vec<Signal> = Vec::with_capacity(requested.len());
    for (sig, _) in &saved {
        if let Err(err) = signals::bind(*sig, runner::dispatch) {
            for (done, original) in &saved {
                if bound.contains(done) {
                    let _ = signals::restore(*done, *original);
                }
            }
            return Err(err);
        }
        bound.push(*sig);
    }

    if panic_hook {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            runner::panic_dispatch(info, previous.as_ref());
        }));
    }

    *state = Some(InstallState {
        root: getpid(),
        bound,
        saved,
    });

    let identity = Identity::current();
    if let Some(installed) = state.as_ref() {
        tracing::debug!(
            process = %identity.name,
            pid = %identity.pid,
            path = %identity.path_string(),
            signals = ?installed.bound.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            replaced = ?installed.saved,
            panic_hook,
            "set as root process, dispatcher installed"
        );
    }

    Ok(())
}

/// Check that the dispatcher is still what the installed signals dispatch to.
///
/// The signal set comes from the install state, but the dispositions are read
/// live: an external `sigaction` reset after installation is caught here, not
/// papered over by a cached flag.
pub(crate) fn ensure_dispatcher_live() -> Result<()> {
    let state = lock_state();
    let Some(state) = state.as_ref() else {
        return Err(ExitError::NotInstalled);
    };

    for sig in &state.bound {
        if signals::query(*sig, runner::dispatch)? != Disposition::Dispatcher {
            return Err(ExitError::NotInstalled);
        }
    }

    Ok(())
}

fn normalize(requested: &[Signal]) -> Vec<Signal> {
    if requested.is_empty() {
        return vec![Signal::SIGTERM];
    }

    let mut signals = Vec::with_capacity(requested.len());
    for sig in requested {
        if !signals.contains(sig) {
            signals.push(*sig);
        }
    }
    signals
}
