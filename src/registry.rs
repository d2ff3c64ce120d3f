//! Process-indexed storage for cleanup callables

use crate::error::Result;
use crate::identity::Identity;
use crate::install;
use nix::unistd::{getpid, Pid};
use once_cell::sync::Lazy;
use std::sync::{Mutex, MutexGuard};

/// The one registry every process in the tree starts from. A forked worker
/// inherits its contents as a snapshot; later mutations in parent and child
/// are mutually invisible.
static REGISTRY: Lazy<Mutex<ExitRegistry>> = Lazy::new(|| Mutex::new(ExitRegistry::new()));

/// Lock the global registry, recovering the value if a previous holder
/// panicked. The guard must never be held across a callable invocation.
pub(crate) fn lock_registry() -> MutexGuard<'static, ExitRegistry> {
    REGISTRY
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Callables are plain function pointers compared by identity.
fn same(a: fn(), b: fn()) -> bool {
    a as usize == b as usize
}

/// Per-pid owned callable lists plus one tree-wide shared list.
///
/// Pid entries keep insertion order. Because a worker inherits its ancestors'
/// entries through fork, the key order doubles as the ancestry path shown in
/// log records.
#[derive(Default)]
pub struct ExitRegistry {
    own: Vec<(Pid, Vec<fn()>)>,
    shared: Vec<fn()>,
}

impl ExitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `func` to `pid`'s own list, creating the entry lazily.
    /// Re-registering the same function is a no-op. Returns true if added.
    pub fn add_own(&mut self, pid: Pid, func: fn()) -> bool {
        if !self.own.iter().any(|(p, _)| *p == pid) {
            self.own.push((pid, Vec::new()));
        }

        let Some((_, list)) = self.own.iter_mut().find(|(p, _)| *p == pid) else {
            return false;
        };

        if list.iter().any(|f| same(*f, func)) {
            return false;
        }
        list.push(func);
        true
    }

    /// Remove `func` from `pid`'s own list. Shared entries are out of reach
    /// here on purpose. Returns true if something was removed.
    pub fn remove_own(&mut self, pid: Pid, func: fn()) -> bool {
        let Some((_, list)) = self.own.iter_mut().find(|(p, _)| *p == pid) else {
            return false;
        };

        let before = list.len();
        list.retain(|f| !same(*f, func));
        list.len() != before
    }

    /// Append `func` to the shared list, deduplicated. Returns true if added.
    pub fn add_shared(&mut self, func: fn()) -> bool {
        if self.shared.iter().any(|f| same(*f, func)) {
            return false;
        }
        self.shared.push(func);
        true
    }

    /// Pids with an own entry, in insertion order.
    pub fn own_pids(&self) -> Vec<Pid> {
        self.own.iter().map(|(p, _)| *p).collect()
    }

    /// Snapshot of what the exit runner must execute for `pid`: the own list
    /// reversed (last registered first), then the shared list reversed.
    pub fn batch_for(&self, pid: Pid) -> (Vec<fn()>, Vec<fn()>) {
        let own = self
            .own
            .iter()
            .find(|(p, _)| *p == pid)
            .map(|(_, list)| list.iter().rev().copied().collect())
            .unwrap_or_default();
        let shared = self.shared.iter().rev().copied().collect();

        (own, shared)
    }
}

/// Add a cleanup callable for this process (or, with `shared`, for every
/// process in the tree). Returns the function unchanged so the call composes
/// as a plain wrapper.
///
/// Fails with [`crate::ExitError::NotInstalled`] unless the dispatcher is
/// currently bound to every installed signal — checked against the live
/// dispositions, so an external reset of a signal is caught here too.
pub fn register(func: fn(), shared: bool) -> Result<fn()> {
    install::ensure_dispatcher_live()?;

    let pid = getpid();
    let added = {
        let mut registry = lock_registry();
        if shared {
            registry.add_shared(func)
        } else {
            registry.add_own(pid, func)
        }
    };

    if added {
        let identity = Identity::current();
        tracing::debug!(
            process = %identity.name,
            pid = %identity.pid,
            path = %identity.path_string(),
            shared,
            "added exit callable"
        );
    }

    Ok(func)
}

/// Remove a cleanup callable from this process's own list. Shared entries are
/// not removable through this call. Returns whether anything was removed.
pub fn unregister(func: fn()) -> Result<bool> {
    install::ensure_dispatcher_live()?;

    let removed = lock_registry().remove_own(getpid(), func);

    if removed {
        let identity = Identity::current();
        tracing::debug!(
            process = %identity.name,
            pid = %identity.pid,
            path = %identity.path_string(),
            "removed exit callable"
        );
    }

    Ok(removed)
}
