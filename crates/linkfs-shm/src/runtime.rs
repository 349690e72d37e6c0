// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Location of the channel directories.

use std::path::{Path, PathBuf};

pub use linkfs_core::injection::RUNTIME_DIR_ENV;

const DEV_SHM: &str = "/dev/shm";

/// Root directory under which each channel gets `<root>/<shm_name>/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeDir {
    root: PathBuf,
}

impl RuntimeDir {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `LINKFS_RUNTIME_DIR`, else `/dev/shm/linkfs`, else `<tmp>/linkfs`.
    pub fn from_env() -> Self {
        if let Some(dir) = std::env::var_os(RUNTIME_DIR_ENV).filter(|v| !v.is_empty()) {
            return Self::at(dir);
        }
        let shm = Path::new(DEV_SHM);
        if shm.is_dir() {
            return Self::at(shm.join("linkfs"));
        }
        Self::at(std::env::temp_dir().join("linkfs"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn channel_dir(&self, shm_name: &str) -> PathBuf {
        self.root.join(shm_name)
    }

    pub(crate) fn create_lock_path(&self) -> PathBuf {
        self.root.join(".create.lock")
    }
}

impl Default for RuntimeDir {
    fn default() -> Self {
        Self::from_env()
    }
}
