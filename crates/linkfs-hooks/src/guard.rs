// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-thread re-entrancy guard.
//!
//! Everything a hook does (decoding the region, walking directories, writing
//! the log) goes through libc again. Those nested calls must reach the real
//! symbols directly.

use std::cell::Cell;

thread_local! {
    static HOOK_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// True when no hook is running on this thread.
///
/// During thread teardown the depth is unavailable; hooks stay out of the way.
pub fn hooks_allowed() -> bool {
    HOOK_DEPTH.try_with(|depth| depth.get() == 0).unwrap_or(false)
}

pub struct HookGuard(());

impl HookGuard {
    pub fn new() -> Self {
        let _ = HOOK_DEPTH.try_with(|depth| depth.set(depth.get() + 1));
        HookGuard(())
    }
}

impl Default for HookGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        let _ = HOOK_DEPTH.try_with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_nest_per_thread() {
        assert!(hooks_allowed());
        {
            let _outer = HookGuard::new();
            assert!(!hooks_allowed());
            {
                let _inner = HookGuard::new();
                assert!(!hooks_allowed());
            }
            assert!(!hooks_allowed());
            std::thread::spawn(|| assert!(hooks_allowed())).join().unwrap();
        }
        assert!(hooks_allowed());
    }
}
