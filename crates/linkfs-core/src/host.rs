// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Access to the real filesystem underneath the overlay

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Kind of an entry as seen on the real filesystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// One name in a directory listing.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListingEntry {
    pub name: OsString,
    pub is_dir: bool,
}

impl ListingEntry {
    pub fn new(name: impl Into<OsString>, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            is_dir,
        }
    }
}

/// Real filesystem operations the mapping table needs.
///
/// Everything the table learns about the disk goes through this trait so that
/// resolution can be exercised against a scripted filesystem in tests.
#[cfg_attr(test, mockall::automock)]
pub trait HostFs: Send + Sync {
    /// Kind of the entry at `path`, following symlinks; `None` if absent.
    fn kind(&self, path: &Path) -> Option<EntryKind>;

    /// Direct children of `path`, without `.` and `..`.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<ListingEntry>>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Creates an empty file, leaving an existing file untouched.
    fn create_file(&self, path: &Path) -> io::Result<()>;
}

/// [`HostFs`] backed by `std::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdHostFs;

impl HostFs for StdHostFs {
    fn kind(&self, path: &Path) -> Option<EntryKind> {
        let meta = fs::metadata(path).ok()?;
        Some(if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<ListingEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            // Symlinked directories are listed as directories.
            let is_dir = match entry.file_type() {
                Ok(ft) if ft.is_symlink() => entry.path().is_dir(),
                Ok(ft) => ft.is_dir(),
                Err(_) => false,
            };
            entries.push(ListingEntry::new(entry.file_name(), is_dir));
        }
        entries.sort();
        Ok(entries)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn create_file(&self, path: &Path) -> io::Result<()> {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|_| ())
    }
}

/// [`HostFs`] that reads through to another one but only records what it
/// would create. Later lookups see the recorded entries.
pub struct PlannedFs<'a> {
    inner: &'a dyn HostFs,
    planned: Mutex<BTreeMap<PathBuf, EntryKind>>,
}

impl<'a> PlannedFs<'a> {
    pub fn new(inner: &'a dyn HostFs) -> Self {
        Self {
            inner,
            planned: Mutex::new(BTreeMap::new()),
        }
    }

    fn planned(&self) -> MutexGuard<'_, BTreeMap<PathBuf, EntryKind>> {
        self.planned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Paths that would have been created, parents before children.
    pub fn created(&self) -> Vec<PathBuf> {
        self.planned().keys().cloned().collect()
    }
}

impl HostFs for PlannedFs<'_> {
    fn kind(&self, path: &Path) -> Option<EntryKind> {
        if let Some(kind) = self.planned().get(path) {
            return Some(*kind);
        }
        self.inner.kind(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<ListingEntry>> {
        let planned_dir = self.planned().get(path) == Some(&EntryKind::Directory);
        let mut entries = if planned_dir {
            Vec::new()
        } else {
            self.inner.read_dir(path)?
        };
        for (child, kind) in self.planned().iter() {
            if child.parent() == Some(path) {
                if let Some(name) = child.file_name() {
                    entries.push(ListingEntry::new(name, *kind == EntryKind::Directory));
                }
            }
        }
        entries.sort();
        entries.dedup();
        Ok(entries)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut missing = Vec::new();
        for ancestor in path.ancestors() {
            match self.kind(ancestor) {
                Some(EntryKind::Directory) => break,
                Some(EntryKind::File) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} is a file", ancestor.display()),
                    ))
                }
                None => missing.push(ancestor.to_path_buf()),
            }
        }
        let mut planned = self.planned();
        for dir in missing {
            planned.insert(dir, EntryKind::Directory);
        }
        Ok(())
    }

    fn create_file(&self, path: &Path) -> io::Result<()> {
        match self.kind(path) {
            Some(EntryKind::File) => Ok(()),
            Some(EntryKind::Directory) => Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a directory", path.display()),
            )),
            None => {
                let parent_is_dir = path
                    .parent()
                    .is_some_and(|parent| self.kind(parent) == Some(EntryKind::Directory));
                if !parent_is_dir {
                    return Err(io::Error::from(io::ErrorKind::NotFound));
                }
                self.planned().insert(path.to_path_buf(), EntryKind::File);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn std_host_reports_kinds_and_sorted_listing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        let host = StdHostFs;
        assert_eq!(host.kind(dir.path()), Some(EntryKind::Directory));
        assert_eq!(host.kind(&dir.path().join("b.txt")), Some(EntryKind::File));
        assert_eq!(host.kind(&dir.path().join("missing")), None);

        let listing = host.read_dir(dir.path()).unwrap();
        assert_eq!(
            listing,
            vec![ListingEntry::new("a", true), ListingEntry::new("b.txt", false)]
        );
    }

    #[test]
    fn create_file_keeps_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keep.txt");
        fs::write(&path, "content").unwrap();
        StdHostFs.create_file(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "content");
    }

    #[test]
    fn planned_fs_records_creations_without_touching_disk() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("plain"), "x").unwrap();
        let planned = PlannedFs::new(&StdHostFs);

        let nested = dir.path().join("out/saves");
        planned.create_dir_all(&nested).unwrap();
        planned.create_file(&nested.join("slot.sav")).unwrap();
        assert_eq!(planned.kind(&nested), Some(EntryKind::Directory));
        assert_eq!(
            planned.read_dir(&nested).unwrap(),
            vec![ListingEntry::new("slot.sav", false)]
        );
        assert_eq!(
            planned.created(),
            vec![
                dir.path().join("out"),
                nested.clone(),
                nested.join("slot.sav")
            ]
        );
        assert!(!dir.path().join("out").exists());

        assert!(planned.create_dir_all(&dir.path().join("plain/sub")).is_err());
        assert!(planned.create_file(&dir.path().join("nowhere/f")).is_err());
    }
}
