//! Raw signal-disposition plumbing over sigaction

use crate::error::{ExitError, Result};
use nix::errno::Errno;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};

/// The dispatcher's function signature as the kernel sees it.
pub(crate) type RawHandler = extern "C" fn(libc::c_int);

/// A signal's current disposition, as far as installation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Default,
    Ignore,
    /// Bound to this crate's dispatcher.
    Dispatcher,
    /// Bound to handler code this crate knows nothing about.
    Foreign,
}

/// Query `sig`'s disposition without modifying it.
///
/// Uses the null new-action form of `sigaction`, which only reads. The
/// returned classification compares the live handler pointer against the
/// dispatcher, so it stays correct even if something outside this crate
/// rebinds the signal.
pub(crate) fn query(sig: Signal, dispatcher: RawHandler) -> Result<Disposition> {
    let mut old: libc::sigaction = unsafe { std::mem::zeroed() };

    let rc = unsafe { libc::sigaction(sig as libc::c_int, std::ptr::null(), &mut old) };
    if rc != 0 {
        return Err(ExitError::Signal(Errno::last()));
    }

    Ok(classify(old.sa_sigaction, dispatcher))
}

fn classify(handler: libc::sighandler_t, dispatcher: RawHandler) -> Disposition {
    let handler = handler as usize;

    if handler == libc::SIG_DFL as usize {
        Disposition::Default
    } else if handler == libc::SIG_IGN as usize {
        Disposition::Ignore
    } else if handler == dispatcher as usize {
        Disposition::Dispatcher
    } else {
        Disposition::Foreign
    }
}

/// Bind the dispatcher to `sig`.
pub(crate) fn bind(sig: Signal, dispatcher: RawHandler) -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(dispatcher),
        SaFlags::empty(),
        SigSet::empty(),
    );

    unsafe { nix::sys::signal::sigaction(sig, &action) }?;
    Ok(())
}

/// Put a captured disposition back (install rollback path). Only default and
/// ignore ever get captured, anything else refuses installation up front.
pub(crate) fn restore(sig: Signal, disposition: Disposition) -> Result<()> {
    let handler = match disposition {
        Disposition::Ignore => SigHandler::SigIgn,
        _ => SigHandler::SigDfl,
    };
    let action = SigAction::new(handler, SaFlags::empty(), SigSet::empty());

    unsafe { nix::sys::signal::sigaction(sig, &action) }?;
    Ok(())
}

/// Block `signals` in the calling thread so a re-delivered trigger cannot
/// re-enter the exit runner while it executes callables.
pub(crate) fn block(signals: &[Signal]) -> Result<()> {
    if signals.is_empty() {
        return Ok(());
    }

    let mut set = SigSet::empty();
    for sig in signals {
        set.add(*sig);
    }

    nix::sys::signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), None)?;
    Ok(())
}
