// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Process liveness checks.

/// Answers whether a process id still names a running process.
#[cfg_attr(test, mockall::automock)]
pub trait Liveness: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Signal 0 probe.
///
/// A zombie still counts as alive, so launched children need to be reaped
/// by their parent.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLiveness;

#[cfg(unix)]
impl Liveness for SystemLiveness {
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            // Exists but belongs to someone else.
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

#[cfg(not(unix))]
impl Liveness for SystemLiveness {
    fn is_alive(&self, pid: u32) -> bool {
        pid == std::process::id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(SystemLiveness.is_alive(std::process::id()));
        assert!(!SystemLiveness.is_alive(0));
    }

    #[cfg(unix)]
    #[test]
    fn reaped_child_is_dead() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!SystemLiveness.is_alive(pid));
    }
}
