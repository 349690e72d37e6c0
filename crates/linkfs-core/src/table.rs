// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The mapping table: virtual path to real path redirections

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LinkfsError, LinkfsResult};
use crate::flags::LinkFlags;
use crate::host::{EntryKind, HostFs, ListingEntry};
use crate::path::normalize;

/// Recursive captures stop descending past this many levels.
pub const MAX_CAPTURE_DEPTH: usize = 64;

/// Whether a link redirects a single file or a directory subtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    File,
    Directory,
}

/// Listing of a real directory taken when a static link was created.
///
/// Keys are paths relative to the linked directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapturedTree {
    entries: BTreeMap<PathBuf, bool>,
}

impl CapturedTree {
    /// Walks `root` and records every name below it.
    ///
    /// Without `recursive` only direct children are recorded.
    pub fn capture(fs: &dyn HostFs, root: &Path, recursive: bool) -> std::io::Result<Self> {
        let mut entries = BTreeMap::new();
        let mut pending = vec![(PathBuf::new(), 0usize)];
        while let Some((rel, depth)) = pending.pop() {
            for child in fs.read_dir(&root.join(&rel))? {
                let child_rel = rel.join(&child.name);
                if child.is_dir && recursive && depth + 1 < MAX_CAPTURE_DEPTH {
                    pending.push((child_rel.clone(), depth + 1));
                }
                entries.insert(child_rel, child.is_dir);
            }
        }
        Ok(Self { entries })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (PathBuf, bool)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// `Some(is_dir)` when `rel` was present at capture time.
    pub fn lookup(&self, rel: &Path) -> Option<bool> {
        self.entries.get(rel).copied()
    }

    /// Captured direct children of `rel`.
    pub fn children(&self, rel: &Path) -> Vec<ListingEntry> {
        self.entries
            .range::<Path, _>((Bound::Excluded(rel), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(rel))
            .filter(|(key, _)| key.parent() == Some(rel))
            .filter_map(|(key, is_dir)| {
                key.file_name().map(|name| ListingEntry::new(name, *is_dir))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, bool)> {
        self.entries.iter().map(|(k, v)| (k.as_path(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One redirection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkEntry {
    pub virtual_path: PathBuf,
    pub real_path: PathBuf,
    pub kind: LinkKind,
    pub flags: LinkFlags,
    /// Present for directory links created without `MONITOR_CHANGES`.
    pub captured: Option<CapturedTree>,
}

impl LinkEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == LinkKind::Directory
    }

    /// Whether a path `depth` components below the virtual directory is in scope.
    pub fn covers_depth(&self, depth: usize) -> bool {
        self.is_dir() && depth >= 1 && (depth == 1 || self.flags.contains(LinkFlags::RECURSIVE))
    }

    /// Whether `rel` exists under this directory link.
    ///
    /// Captured links answer from the capture; names created later through a
    /// `CREATE_TARGET` link are found on disk.
    pub fn lookup_child(&self, fs: &dyn HostFs, rel: &Path) -> Option<bool> {
        let live = || {
            fs.kind(&self.real_path.join(rel))
                .map(|kind| kind == EntryKind::Directory)
        };
        match &self.captured {
            Some(tree) => tree.lookup(rel).or_else(|| {
                if self.flags.contains(LinkFlags::CREATE_TARGET) {
                    live()
                } else {
                    None
                }
            }),
            None => live(),
        }
    }

    /// Children of `rel` under this directory link.
    pub fn children(&self, fs: &dyn HostFs, rel: &Path) -> Vec<ListingEntry> {
        let live = || fs.read_dir(&self.real_path.join(rel)).unwrap_or_default();
        match &self.captured {
            Some(tree) if self.flags.contains(LinkFlags::CREATE_TARGET) => {
                let mut entries = tree.children(rel);
                for entry in live() {
                    if !entries.iter().any(|e| e.name == entry.name) {
                        entries.push(entry);
                    }
                }
                entries
            }
            Some(tree) => tree.children(rel),
            None => live(),
        }
    }
}

/// Every active link plus a generation counter bumped on each change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappingTable {
    generation: u64,
    links: BTreeMap<PathBuf, LinkEntry>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a table from entries already validated elsewhere.
    pub fn from_parts(generation: u64, entries: impl IntoIterator<Item = LinkEntry>) -> Self {
        Self {
            generation,
            links: entries
                .into_iter()
                .map(|entry| (entry.virtual_path.clone(), entry))
                .collect(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn get(&self, virtual_path: &Path) -> Option<&LinkEntry> {
        self.links.get(virtual_path)
    }

    /// Links ordered by virtual path.
    pub fn iter(&self) -> impl Iterator<Item = &LinkEntry> {
        self.links.values()
    }

    /// Maps the virtual file `source` onto the real file `destination`.
    pub fn link_file(
        &mut self,
        fs: &dyn HostFs,
        source: &Path,
        destination: &Path,
        flags: LinkFlags,
    ) -> LinkfsResult<()> {
        let virtual_path = normalize(source, None)?;
        let real_path = normalize(destination, None)?;
        self.check_replaceable(&virtual_path, flags)?;

        match fs.kind(&real_path) {
            Some(EntryKind::File) => {}
            Some(EntryKind::Directory) => return Err(LinkfsError::IsADirectory(real_path)),
            None if flags.contains(LinkFlags::CREATE_TARGET) => {
                if let Some(parent) = real_path.parent() {
                    fs.create_dir_all(parent)?;
                }
                fs.create_file(&real_path)?;
            }
            None => return Err(LinkfsError::DestinationMissing(real_path)),
        }

        debug!(
            virtual_path = %virtual_path.display(),
            real_path = %real_path.display(),
            %flags,
            "linking file"
        );
        self.insert(LinkEntry {
            virtual_path,
            real_path,
            kind: LinkKind::File,
            flags,
            captured: None,
        });
        Ok(())
    }

    /// Maps the virtual directory `source` onto the real directory `destination`.
    ///
    /// Unless `MONITOR_CHANGES` is set the destination's listing is captured
    /// now and later changes to it are not reflected.
    pub fn link_directory_static(
        &mut self,
        fs: &dyn HostFs,
        source: &Path,
        destination: &Path,
        flags: LinkFlags,
    ) -> LinkfsResult<()> {
        let virtual_path = normalize(source, None)?;
        let real_path = normalize(destination, None)?;
        self.check_replaceable(&virtual_path, flags)?;

        match fs.kind(&real_path) {
            Some(EntryKind::Directory) => {}
            Some(EntryKind::File) => return Err(LinkfsError::NotADirectory(real_path)),
            None if flags.contains(LinkFlags::CREATE_TARGET) => fs.create_dir_all(&real_path)?,
            None => return Err(LinkfsError::DestinationMissing(real_path)),
        }

        let captured = if flags.contains(LinkFlags::MONITOR_CHANGES) {
            None
        } else {
            Some(CapturedTree::capture(
                fs,
                &real_path,
                flags.contains(LinkFlags::RECURSIVE),
            )?)
        };

        debug!(
            virtual_path = %virtual_path.display(),
            real_path = %real_path.display(),
            %flags,
            captured = captured.as_ref().map(CapturedTree::len),
            "linking directory"
        );
        self.insert(LinkEntry {
            virtual_path,
            real_path,
            kind: LinkKind::Directory,
            flags,
            captured,
        });
        Ok(())
    }

    /// Removes the link at `source`; returns whether one existed.
    pub fn remove(&mut self, source: &Path) -> LinkfsResult<bool> {
        let virtual_path = normalize(source, None)?;
        let removed = self.links.remove(&virtual_path).is_some();
        if removed {
            self.generation += 1;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.generation += 1;
    }

    /// Links strictly below `virtual_dir`, in path order.
    pub fn descendants<'a>(&'a self, virtual_dir: &'a Path) -> impl Iterator<Item = &'a LinkEntry> {
        self.links
            .range::<Path, _>((Bound::Excluded(virtual_dir), Bound::Unbounded))
            .take_while(move |(key, _)| key.starts_with(virtual_dir))
            .map(|(_, entry)| entry)
    }

    /// Whether some link lives strictly below `path`.
    pub fn has_descendants(&self, path: &Path) -> bool {
        self.descendants(path).next().is_some()
    }

    /// Real-to-virtual view of the table.
    pub fn inverse(&self) -> InverseTable {
        InverseTable::new(self.links.values().map(|entry| InverseEntry {
            real_path: entry.real_path.clone(),
            virtual_path: entry.virtual_path.clone(),
            kind: entry.kind,
        }))
    }

    fn check_replaceable(&self, virtual_path: &Path, flags: LinkFlags) -> LinkfsResult<()> {
        if flags.contains(LinkFlags::FAIL_IF_EXISTS) && self.links.contains_key(virtual_path) {
            return Err(LinkfsError::AlreadyLinked(virtual_path.to_path_buf()));
        }
        Ok(())
    }

    fn insert(&mut self, entry: LinkEntry) {
        self.links.insert(entry.virtual_path.clone(), entry);
        self.generation += 1;
    }
}

/// One real-to-virtual translation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InverseEntry {
    pub real_path: PathBuf,
    pub virtual_path: PathBuf,
    pub kind: LinkKind,
}

/// Translates real paths back into the virtual view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InverseTable {
    entries: Vec<InverseEntry>,
}

impl InverseTable {
    pub fn new(entries: impl IntoIterator<Item = InverseEntry>) -> Self {
        let mut entries: Vec<InverseEntry> = entries.into_iter().collect();
        entries.sort_by(|a, b| {
            a.real_path
                .cmp(&b.real_path)
                .then_with(|| a.virtual_path.cmp(&b.virtual_path))
        });
        Self { entries }
    }

    pub fn entries(&self) -> &[InverseEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Virtual path under which `real` is visible, preferring the longest
    /// matching real prefix.
    pub fn resolve(&self, real: &Path) -> Option<PathBuf> {
        let mut best: Option<(&InverseEntry, usize)> = None;
        for entry in &self.entries {
            let matched = match entry.kind {
                LinkKind::File => entry.real_path == real,
                LinkKind::Directory => real.starts_with(&entry.real_path),
            };
            if !matched {
                continue;
            }
            let len = entry.real_path.components().count();
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((entry, len));
            }
        }
        let (entry, _) = best?;
        let rest = real.strip_prefix(&entry.real_path).ok()?;
        if rest.as_os_str().is_empty() {
            Some(entry.virtual_path.clone())
        } else {
            Some(entry.virtual_path.join(rest))
        }
    }
}
