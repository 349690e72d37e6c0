// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Temporary directory trees for redirection tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory populated through a small builder API.
///
/// ```ignore
/// let tree = TestTree::new()?
///     .file("mods/a.txt", "A")?
///     .dir("game/data")?;
/// let real = tree.path("mods/a.txt");
/// ```
pub struct TestTree {
    root: TempDir,
}

impl TestTree {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            root: tempfile::Builder::new().prefix("linkfs-test-").tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Absolute path of `rel` inside the tree; nothing is created.
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.path().join(rel)
    }

    /// Writes a file, creating its parent directories.
    pub fn file(self, rel: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> io::Result<Self> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(self)
    }

    pub fn dir(self, rel: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(self.path(rel))?;
        Ok(self)
    }

    pub fn read(&self, rel: impl AsRef<Path>) -> io::Result<String> {
        fs::read_to_string(self.path(rel))
    }

    pub fn exists(&self, rel: impl AsRef<Path>) -> bool {
        self.path(rel).exists()
    }

    /// Sorted names of the entries directly under `rel`.
    pub fn names(&self, rel: impl AsRef<Path>) -> io::Result<Vec<String>> {
        let mut names = fs::read_dir(self.path(rel))?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[crate::logged_test]
    fn builds_nested_files() {
        let tree = TestTree::new()
            .unwrap()
            .file("mods/textures/a.dds", "a")
            .unwrap()
            .file("mods/readme.txt", "r")
            .unwrap()
            .dir("game")
            .unwrap();
        assert_eq!(tree.read("mods/textures/a.dds").unwrap(), "a");
        assert_eq!(tree.names("mods").unwrap(), vec!["readme.txt", "textures"]);
        assert!(tree.exists("game"));
        assert!(!tree.exists("missing"));
    }
}
