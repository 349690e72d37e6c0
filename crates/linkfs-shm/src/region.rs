// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Region files published by atomic replacement.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Identity of one published version of a region file.
///
/// Every publish renames a new file into place, so the inode changes even
/// when size and mtime happen to match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileIdentity {
    dev: u64,
    ino: u64,
    len: u64,
    modified: Option<SystemTime>,
}

impl FileIdentity {
    fn of(metadata: &fs::Metadata) -> Self {
        #[cfg(unix)]
        let (dev, ino) = {
            use std::os::unix::fs::MetadataExt;
            (metadata.dev(), metadata.ino())
        };
        #[cfg(not(unix))]
        let (dev, ino) = (0, 0);
        Self {
            dev,
            ino,
            len: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionFile {
    path: PathBuf,
}

impl RegionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> io::Result<FileIdentity> {
        fs::metadata(&self.path).map(|m| FileIdentity::of(&m))
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    /// Reads the content together with the identity it was read from.
    pub fn read_with_identity(&self) -> io::Result<(Vec<u8>, FileIdentity)> {
        let mut file = fs::File::open(&self.path)?;
        let identity = FileIdentity::of(&file.metadata()?);
        let mut bytes = Vec::with_capacity(identity.len as usize);
        io::Read::read_to_end(&mut file, &mut bytes)?;
        Ok((bytes, identity))
    }

    /// Replaces the file content; readers see either the old or the new bytes.
    pub fn publish(&self, bytes: &[u8]) -> io::Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "region has no parent"))?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".publish-")
            .tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_data()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_changes_identity() {
        let dir = tempfile::tempdir().unwrap();
        let region = RegionFile::new(dir.path().join("region"));

        region.publish(b"first").unwrap();
        let (bytes, first) = region.read_with_identity().unwrap();
        assert_eq!(bytes, b"first");

        region.publish(b"other").unwrap();
        let second = region.identity().unwrap();
        assert_ne!(first, second);
        assert_eq!(region.read().unwrap(), b"other");
    }

    #[test]
    fn publish_leaves_no_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let region = RegionFile::new(dir.path().join("region"));
        region.publish(b"x").unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("region")]);
    }
}
