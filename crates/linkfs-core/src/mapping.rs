// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Declarative link sets applied in one go.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::LinkfsResult;
use crate::flags::LinkFlags;
use crate::host::{HostFs, PlannedFs};
use crate::path::normalize;
use crate::table::{LinkKind, MappingTable};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Virtual path.
    pub source: PathBuf,
    /// Real path.
    pub destination: PathBuf,
    pub kind: LinkKind,
    pub flags: LinkFlags,
}

impl MappingEntry {
    pub fn link(&self, table: &mut MappingTable, fs: &dyn HostFs) -> LinkfsResult<()> {
        match self.kind {
            LinkKind::File => table.link_file(fs, &self.source, &self.destination, self.flags),
            LinkKind::Directory => {
                table.link_directory_static(fs, &self.source, &self.destination, self.flags)
            }
        }
    }
}

/// Replaces the contents of `table` with `entries`.
///
/// The whole batch is first linked against a [`PlannedFs`], so an invalid
/// entry fails before any `CREATE_TARGET` entry creates its target.
pub fn apply_entries(
    table: &mut MappingTable,
    fs: &dyn HostFs,
    entries: &[MappingEntry],
) -> LinkfsResult<()> {
    let planned = PlannedFs::new(fs);
    let mut scratch = MappingTable::new();
    for entry in entries {
        entry.link(&mut scratch, &planned)?;
    }

    table.clear();
    for entry in entries {
        entry.link(table, fs)?;
    }
    Ok(())
}

/// An ordered list of links that replaces the whole table when applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping {
    entries: Vec<MappingEntry>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: MappingEntry) {
        self.entries.push(entry);
    }

    pub fn file(
        mut self,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        flags: LinkFlags,
    ) -> Self {
        self.push(MappingEntry {
            source: source.into(),
            destination: destination.into(),
            kind: LinkKind::File,
            flags,
        });
        self
    }

    pub fn directory(
        mut self,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        flags: LinkFlags,
    ) -> Self {
        self.push(MappingEntry {
            source: source.into(),
            destination: destination.into(),
            kind: LinkKind::Directory,
            flags,
        });
        self
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in application order: directories first, then files, each
    /// group in declaration order, with relative paths resolved against
    /// `base`.
    ///
    /// Files go last so a file link inside a linked directory is not hidden
    /// by the directory link's capture.
    pub fn resolved(&self, base: &Path) -> LinkfsResult<Vec<MappingEntry>> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in &self.entries {
            let resolved = MappingEntry {
                source: normalize(&entry.source, Some(base))?,
                destination: normalize(&entry.destination, Some(base))?,
                kind: entry.kind,
                flags: entry.flags,
            };
            match entry.kind {
                LinkKind::Directory => dirs.push(resolved),
                LinkKind::File => files.push(resolved),
            }
        }
        dirs.extend(files);
        Ok(dirs)
    }
}

impl FromIterator<MappingEntry> for Mapping {
    fn from_iter<I: IntoIterator<Item = MappingEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_orders_directories_first() {
        let mapping = Mapping::new()
            .file("game/plugin.esp", "/mods/p.esp", LinkFlags::empty())
            .directory("game/data", "mods/data", LinkFlags::RECURSIVE);

        let resolved = mapping.resolved(Path::new("/home/user")).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].kind, LinkKind::Directory);
        assert_eq!(resolved[0].source, PathBuf::from("/home/user/game/data"));
        assert_eq!(resolved[0].destination, PathBuf::from("/home/user/mods/data"));
        assert_eq!(resolved[1].destination, PathBuf::from("/mods/p.esp"));
    }

    #[test]
    fn resolved_rejects_empty_paths() {
        let mapping = Mapping::new().file("", "/x", LinkFlags::empty());
        assert!(mapping.resolved(Path::new("/")).is_err());
    }

    #[test]
    fn invalid_entry_stops_the_batch_before_any_creation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), "r").unwrap();
        let mut table = MappingTable::new();
        table
            .link_file(
                &crate::StdHostFs,
                Path::new("/virtual/kept.txt"),
                &dir.path().join("real.txt"),
                LinkFlags::empty(),
            )
            .unwrap();

        let entries = Mapping::new()
            .directory("/virtual/out", dir.path().join("overwrite/new"), LinkFlags::CREATE_TARGET)
            .file("/virtual/saves/a.sav", dir.path().join("saves/a.sav"), LinkFlags::CREATE_TARGET)
            .file("/virtual/gone.txt", dir.path().join("missing.txt"), LinkFlags::empty())
            .resolved(dir.path())
            .unwrap();
        assert!(apply_entries(&mut table, &crate::StdHostFs, &entries).is_err());

        assert!(!dir.path().join("overwrite").exists());
        assert!(!dir.path().join("saves").exists());
        assert_eq!(table.len(), 1);
        assert!(table.get(Path::new("/virtual/kept.txt")).is_some());
    }

    #[test]
    fn valid_batch_creates_its_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = MappingTable::new();
        let entries = Mapping::new()
            .directory("/virtual/out", dir.path().join("overwrite/new"), LinkFlags::CREATE_TARGET)
            .file("/virtual/out/a.sav", dir.path().join("saves/a.sav"), LinkFlags::CREATE_TARGET)
            .resolved(dir.path())
            .unwrap();
        apply_entries(&mut table, &crate::StdHostFs, &entries).unwrap();

        assert!(dir.path().join("overwrite/new").is_dir());
        assert!(dir.path().join("saves/a.sav").is_file());
        assert_eq!(table.len(), 2);
    }
}
