// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Attached process set, one marker file per process id.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use linkfs_core::MAX_PROCESS_LIST_LEN;
use tracing::trace;

use crate::liveness::Liveness;

/// Attached process ids, ascending.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessList {
    pub pids: Vec<u32>,
    /// More processes were attached than `pids` holds.
    pub truncated: bool,
}

impl ProcessList {
    /// Sorts, de-duplicates and caps `pids`.
    pub fn from_pids(mut pids: Vec<u32>) -> Self {
        pids.sort_unstable();
        pids.dedup();
        let truncated = pids.len() > MAX_PROCESS_LIST_LEN;
        pids.truncate(MAX_PROCESS_LIST_LEN);
        Self { pids, truncated }
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.pids.binary_search(&pid).is_ok()
    }
}

#[derive(Clone, Debug)]
pub struct ProcessRegistry {
    dir: PathBuf,
}

impl ProcessRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker(&self, pid: u32) -> PathBuf {
        self.dir.join(pid.to_string())
    }

    pub fn register(&self, pid: u32) -> io::Result<()> {
        fs::write(self.marker(pid), b"")
    }

    /// Returns whether a marker was removed.
    pub fn unregister(&self, pid: u32) -> io::Result<bool> {
        match fs::remove_file(self.marker(pid)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn is_registered(&self, pid: u32) -> bool {
        self.marker(pid).exists()
    }

    /// Every live registered pid; markers of dead processes are removed.
    pub fn live_pids(&self, liveness: &dyn Liveness) -> io::Result<Vec<u32>> {
        let mut pids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            if liveness.is_alive(pid) {
                pids.push(pid);
            } else {
                trace!(pid, "pruning dead process marker");
                let _ = fs::remove_file(entry.path());
            }
        }
        pids.sort_unstable();
        Ok(pids)
    }

    pub fn list(&self, liveness: &dyn Liveness) -> io::Result<ProcessList> {
        Ok(ProcessList::from_pids(self.live_pids(liveness)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::MockLiveness;

    fn registry() -> (tempfile::TempDir, ProcessRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new(dir.path());
        (dir, registry)
    }

    #[test]
    fn dead_processes_are_pruned() {
        let (_dir, registry) = registry();
        for pid in [30, 10, 20] {
            registry.register(pid).unwrap();
        }
        let mut liveness = MockLiveness::new();
        liveness.expect_is_alive().returning(|pid| pid != 20);

        let list = registry.list(&liveness).unwrap();
        assert_eq!(list.pids, vec![10, 30]);
        assert!(!list.truncated);
        assert!(!registry.is_registered(20));
    }

    #[test]
    fn list_is_capped_with_flag() {
        let (_dir, registry) = registry();
        for pid in 1..=70 {
            registry.register(pid).unwrap();
        }
        let mut liveness = MockLiveness::new();
        liveness.expect_is_alive().return_const(true);

        let list = registry.list(&liveness).unwrap();
        assert_eq!(list.pids.len(), MAX_PROCESS_LIST_LEN);
        assert!(list.truncated);
        assert_eq!(list.pids.first(), Some(&1));
        assert_eq!(list.pids.last(), Some(&64));
    }

    #[test]
    fn unregister_is_idempotent() {
        let (_dir, registry) = registry();
        registry.register(5).unwrap();
        assert!(registry.unregister(5).unwrap());
        assert!(!registry.unregister(5).unwrap());
    }

    #[test]
    fn foreign_files_are_ignored() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("notes"), b"").unwrap();
        registry.register(7).unwrap();
        let mut liveness = MockLiveness::new();
        liveness.expect_is_alive().return_const(true);
        assert_eq!(registry.live_pids(&liveness).unwrap(), vec![7]);
    }
}
