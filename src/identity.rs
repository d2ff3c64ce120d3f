//! Process identity for diagnostics: name, pid, and ancestry path

use nix::unistd::{getpid, Pid};
use std::fmt;

/// Who is logging: the current process plus the pid path that led to it.
///
/// The ancestry path is reconstructed from the own-registry key order, which a
/// forked worker inherits from its ancestors as a snapshot.
pub(crate) struct Identity {
    pub name: String,
    pub pid: Pid,
    pub path: Vec<Pid>,
}

impl Identity {
    /// Capture the current process identity. `ancestors` is the pid insertion
    /// order of the own registry; the current pid is appended if absent.
    pub fn capture(ancestors: &[Pid]) -> Self {
        let pid = getpid();
        let mut path = ancestors.to_vec();
        if path.last() != Some(&pid) {
            path.push(pid);
        }

        Self {
            name: process_name(),
            pid,
            path,
        }
    }

    /// Capture identity from the live global registry.
    pub fn current() -> Self {
        let registry = crate::registry::lock_registry();
        Self::capture(&registry.own_pids())
    }

    pub fn path_string(&self) -> String {
        self.path
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "process \"{}\" (pid: {}, path: {})",
            self.name,
            self.pid,
            self.path_string()
        )
    }
}

/// Best-effort executable name for log records.
fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_appends_own_pid_to_ancestry() {
        let ancestor = Pid::from_raw(1);
        let identity = Identity::capture(&[ancestor]);

        assert_eq!(identity.pid, getpid());
        assert_eq!(identity.path.first(), Some(&ancestor));
        assert_eq!(identity.path.last(), Some(&getpid()));
    }

    #[test]
    fn capture_does_not_duplicate_own_pid() {
        let identity = Identity::capture(&[getpid()]);
        assert_eq!(identity.path, vec![getpid()]);
    }

    #[test]
    fn display_contains_pid_and_path() {
        let identity = Identity::capture(&[Pid::from_raw(42)]);
        let rendered = identity.to_string();

        assert!(rendered.contains("42"));
        assert!(rendered.contains(&getpid().to_string()));
    }
}
