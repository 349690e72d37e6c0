// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path resolution against a mapping table
//!
//! The interception layer asks a [`PathResolver`] what to do with every path
//! it sees. Resolution never fails: anything the resolver cannot make sense of
//! is passed through untouched.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::flags::LinkFlags;
use crate::host::{EntryKind, HostFs, ListingEntry};
use crate::path::{depth, normalize};
use crate::table::{InverseTable, MappingTable};

/// What the caller intends to do with a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Open, stat, list or execute something that should already exist.
    Read,
    /// Create a new entry (`O_CREAT`, `mkdir`, rename target).
    Create,
}

/// Outcome of resolving a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Use the path as given.
    PassThrough,
    /// Use this real path instead.
    Redirected(PathBuf),
    /// The path exists only because links live below it.
    VirtualDirectory,
}

impl Resolution {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Resolution::PassThrough)
    }
}

/// Seam between the OS hooks and the redirection rules.
pub trait PathResolver {
    /// Decide where an access to the absolute `path` should go.
    fn resolve(&self, path: &Path, access: Access) -> Resolution;

    /// Merged listing of `path`, or `None` when no mapping touches it.
    fn list_dir(&self, path: &Path) -> Option<Vec<ListingEntry>>;

    /// Virtual path under which the real path `real` is visible.
    fn reverse(&self, real: &Path) -> Option<PathBuf>;
}

/// [`PathResolver`] over one table snapshot.
pub struct TableResolver<'a> {
    table: &'a MappingTable,
    inverse: Option<&'a InverseTable>,
    fs: &'a dyn HostFs,
}

impl<'a> TableResolver<'a> {
    pub fn new(table: &'a MappingTable, fs: &'a dyn HostFs) -> Self {
        Self {
            table,
            inverse: None,
            fs,
        }
    }

    /// Use a precomputed inverse table for [`PathResolver::reverse`].
    pub fn with_inverse(mut self, inverse: &'a InverseTable) -> Self {
        self.inverse = Some(inverse);
        self
    }

    fn resolve_normalized(&self, path: &Path, access: Access) -> Resolution {
        if let Some(entry) = self.table.get(path) {
            return Resolution::Redirected(entry.real_path.clone());
        }

        // Innermost directory link first; outer links fill in what inner
        // links do not cover.
        let mut create_target = None;
        for ancestor in path.ancestors().skip(1) {
            let Some(entry) = self.table.get(ancestor) else {
                continue;
            };
            let Ok(rel) = path.strip_prefix(ancestor) else {
                continue;
            };
            if !entry.covers_depth(depth(rel)) {
                continue;
            }
            if entry.lookup_child(self.fs, rel).is_some() {
                return Resolution::Redirected(entry.real_path.join(rel));
            }
            if access == Access::Create
                && create_target.is_none()
                && entry.flags.contains(LinkFlags::CREATE_TARGET)
            {
                create_target = Some(entry.real_path.join(rel));
            }
        }
        if let Some(target) = create_target {
            return Resolution::Redirected(target);
        }

        if self.table.has_descendants(path) && self.fs.kind(path).is_none() {
            return Resolution::VirtualDirectory;
        }
        Resolution::PassThrough
    }
}

impl PathResolver for TableResolver<'_> {
    fn resolve(&self, path: &Path, access: Access) -> Resolution {
        if self.table.is_empty() {
            return Resolution::PassThrough;
        }
        match normalize(path, None) {
            Ok(path) => self.resolve_normalized(&path, access),
            Err(_) => Resolution::PassThrough,
        }
    }

    fn list_dir(&self, path: &Path) -> Option<Vec<ListingEntry>> {
        if self.table.is_empty() {
            return None;
        }
        let path = normalize(path, None).ok()?;
        let mut merged: BTreeMap<OsString, bool> = BTreeMap::new();
        let mut add = |entry: ListingEntry| {
            *merged.entry(entry.name).or_insert(false) |= entry.is_dir;
        };
        let mut involved = false;

        for ancestor in path.ancestors() {
            let Some(entry) = self.table.get(ancestor) else {
                continue;
            };
            if !entry.is_dir() {
                continue;
            }
            let Ok(rel) = path.strip_prefix(ancestor) else {
                continue;
            };
            let depth = depth(rel);
            // Listing `rel` exposes names one level further down.
            if !entry.covers_depth(depth + 1) {
                continue;
            }
            if depth > 0 && entry.lookup_child(self.fs, rel) != Some(true) {
                continue;
            }
            involved = true;
            for child in entry.children(self.fs, rel) {
                add(child);
            }
        }

        for link in self.table.descendants(&path) {
            let Ok(rel) = link.virtual_path.strip_prefix(&path) else {
                continue;
            };
            let mut components = rel.components();
            let Some(Component::Normal(first)) = components.next() else {
                continue;
            };
            let nested = components.next().is_some();
            involved = true;
            add(ListingEntry::new(first, nested || link.is_dir()));
        }

        if !involved {
            return None;
        }

        if self.fs.kind(&path) == Some(EntryKind::Directory) {
            for child in self.fs.read_dir(&path).unwrap_or_default() {
                add(child);
            }
        }

        Some(
            merged
                .into_iter()
                .map(|(name, is_dir)| ListingEntry { name, is_dir })
                .collect(),
        )
    }

    fn reverse(&self, real: &Path) -> Option<PathBuf> {
        let real = normalize(real, None).ok()?;
        match self.inverse {
            Some(inverse) => inverse.resolve(&real),
            None => self.table.inverse().resolve(&real),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MockHostFs, StdHostFs};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().to_path_buf();
            fs::create_dir_all(root.join("mods/a/textures")).unwrap();
            fs::write(root.join("mods/a/plugin.esp"), "plugin").unwrap();
            fs::write(root.join("mods/a/textures/sky.dds"), "sky").unwrap();
            fs::create_dir_all(root.join("overwrite")).unwrap();
            fs::create_dir_all(root.join("game/data")).unwrap();
            fs::write(root.join("game/data/base.esm"), "base").unwrap();
            fs::write(root.join("config.ini"), "ini").unwrap();
            Self { _dir: dir, root }
        }

        fn p(&self, rel: &str) -> PathBuf {
            self.root.join(rel)
        }
    }

    #[test]
    fn file_link_redirects_exact_path_only() {
        let fx = Fixture::new();
        let mut table = MappingTable::new();
        table
            .link_file(
                &StdHostFs,
                &fx.p("game/config.ini"),
                &fx.p("config.ini"),
                LinkFlags::empty(),
            )
            .unwrap();
        let resolver = TableResolver::new(&table, &StdHostFs);
        assert_eq!(
            resolver.resolve(&fx.p("game/config.ini"), Access::Read),
            Resolution::Redirected(fx.p("config.ini"))
        );
        assert_eq!(
            resolver.resolve(&fx.p("game/other.ini"), Access::Read),
            Resolution::PassThrough
        );
    }

    #[test]
    fn recursive_link_resolves_deep_descendants() {
        let fx = Fixture::new();
        let mut table = MappingTable::new();
        table
            .link_directory_static(
                &StdHostFs,
                &fx.p("game/data"),
                &fx.p("mods/a"),
                LinkFlags::RECURSIVE,
            )
            .unwrap();
        let resolver = TableResolver::new(&table, &StdHostFs);
        assert_eq!(
            resolver.resolve(&fx.p("game/data/textures/sky.dds"), Access::Read),
            Resolution::Redirected(fx.p("mods/a/textures/sky.dds"))
        );
        // Names the link does not provide fall through to the real directory.
        assert_eq!(
            resolver.resolve(&fx.p("game/data/base.esm"), Access::Read),
            Resolution::PassThrough
        );
    }

    #[test]
    fn non_recursive_link_covers_direct_children_only() {
        let fx = Fixture::new();
        let mut table = MappingTable::new();
        table
            .link_directory_static(
                &StdHostFs,
                &fx.p("game/data"),
                &fx.p("mods/a"),
                LinkFlags::empty(),
            )
            .unwrap();
        let resolver = TableResolver::new(&table, &StdHostFs);
        assert_eq!(
            resolver.resolve(&fx.p("game/data/plugin.esp"), Access::Read),
            Resolution::Redirected(fx.p("mods/a/plugin.esp"))
        );
        assert_eq!(
            resolver.resolve(&fx.p("game/data/textures/sky.dds"), Access::Read),
            Resolution::PassThrough
        );
    }

    #[test]
    fn static_link_ignores_later_additions() {
        let fx = Fixture::new();
        let mut table = MappingTable::new();
        table
            .link_directory_static(
                &StdHostFs,
                &fx.p("game/data"),
                &fx.p("mods/a"),
                LinkFlags::RECURSIVE,
            )
            .unwrap();
        fs::write(fx.p("mods/a/late.esp"), "late").unwrap();
        let resolver = TableResolver::new(&table, &StdHostFs);
        assert_eq!(
            resolver.resolve(&fx.p("game/data/late.esp"), Access::Read),
            Resolution::PassThrough
        );
    }

    #[test]
    fn monitored_link_sees_later_additions() {
        let fx = Fixture::new();
        let mut table = MappingTable::new();
        table
            .link_directory_static(
                &StdHostFs,
                &fx.p("game/data"),
                &fx.p("mods/a"),
                LinkFlags::RECURSIVE | LinkFlags::MONITOR_CHANGES,
            )
            .unwrap();
        fs::write(fx.p("mods/a/late.esp"), "late").unwrap();
        let resolver = TableResolver::new(&table, &StdHostFs);
        assert_eq!(
            resolver.resolve(&fx.p("game/data/late.esp"), Access::Read),
            Resolution::Redirected(fx.p("mods/a/late.esp"))
        );
    }

    #[test]
    fn inner_link_wins_over_outer() {
        let fx = Fixture::new();
        fs::write(fx.p("overwrite/plugin.esp"), "newer").unwrap();
        let mut table = MappingTable::new();
        table
            .link_directory_static(
                &StdHostFs,
                &fx.p("game"),
                &fx.p("mods"),
                LinkFlags::RECURSIVE,
            )
            .unwrap();
        table
            .link_directory_static(
                &StdHostFs,
                &fx.p("game/a"),
                &fx.p("overwrite"),
                LinkFlags::RECURSIVE,
            )
            .unwrap();
        let resolver = TableResolver::new(&table, &StdHostFs);
        assert_eq!(
            resolver.resolve(&fx.p("game/a/plugin.esp"), Access::Read),
            Resolution::Redirected(fx.p("overwrite/plugin.esp"))
        );
        // Not provided by the inner link, so the outer one answers.
        assert_eq!(
            resolver.resolve(&fx.p("game/a/textures/sky.dds"), Access::Read),
            Resolution::Redirected(fx.p("mods/a/textures/sky.dds"))
        );
    }

    #[test]
    fn creations_go_to_innermost_create_target() {
        let fx = Fixture::new();
        let mut table = MappingTable::new();
        table
            .link_directory_static(
                &StdHostFs,
                &fx.p("game"),
                &fx.p("mods"),
                LinkFlags::RECURSIVE | LinkFlags::CREATE_TARGET,
            )
            .unwrap();
        table
            .link_directory_static(
                &StdHostFs,
                &fx.p("game/data"),
                &fx.p("overwrite"),
                LinkFlags::RECURSIVE | LinkFlags::CREATE_TARGET,
            )
            .unwrap();
        let resolver = TableResolver::new(&table, &StdHostFs);
        assert_eq!(
            resolver.resolve(&fx.p("game/data/new.txt"), Access::Create),
            Resolution::Redirected(fx.p("overwrite/new.txt"))
        );
        assert_eq!(
            resolver.resolve(&fx.p("game/data/new.txt"), Access::Read),
            Resolution::PassThrough
        );

        // Once created it stays visible through the link.
        fs::write(fx.p("overwrite/new.txt"), "created").unwrap();
        assert_eq!(
            resolver.resolve(&fx.p("game/data/new.txt"), Access::Read),
            Resolution::Redirected(fx.p("overwrite/new.txt"))
        );
    }

    #[test]
    fn intermediate_directories_are_virtual() {
        let fx = Fixture::new();
        let mut table = MappingTable::new();
        table
            .link_file(
                &StdHostFs,
                &fx.p("nowhere/deeper/config.ini"),
                &fx.p("config.ini"),
                LinkFlags::empty(),
            )
            .unwrap();
        let resolver = TableResolver::new(&table, &StdHostFs);
        assert_eq!(
            resolver.resolve(&fx.p("nowhere"), Access::Read),
            Resolution::VirtualDirectory
        );
        assert_eq!(
            resolver.list_dir(&fx.p("nowhere")),
            Some(vec![ListingEntry::new("deeper", true)])
        );
        assert_eq!(
            resolver.list_dir(&fx.p("nowhere/deeper")),
            Some(vec![ListingEntry::new("config.ini", false)])
        );
        // The root of the fixture exists for real and lists its own content.
        assert_eq!(resolver.resolve(&fx.root, Access::Read), Resolution::PassThrough);
    }

    #[test]
    fn merged_listing_combines_real_and_linked_names() {
        let fx = Fixture::new();
        let mut table = MappingTable::new();
        table
            .link_directory_static(
                &StdHostFs,
                &fx.p("game/data"),
                &fx.p("mods/a"),
                LinkFlags::RECURSIVE,
            )
            .unwrap();
        table
            .link_file(
                &StdHostFs,
                &fx.p("game/data/user.ini"),
                &fx.p("config.ini"),
                LinkFlags::empty(),
            )
            .unwrap();
        let resolver = TableResolver::new(&table, &StdHostFs);
        let listing = resolver.list_dir(&fx.p("game/data")).unwrap();
        assert_eq!(
            listing,
            vec![
                ListingEntry::new("base.esm", false),
                ListingEntry::new("plugin.esp", false),
                ListingEntry::new("textures", true),
                ListingEntry::new("user.ini", false),
            ]
        );
        assert_eq!(
            resolver.list_dir(&fx.p("game/data/textures")),
            Some(vec![ListingEntry::new("sky.dds", false)])
        );
        assert_eq!(resolver.list_dir(&fx.p("overwrite")), None);
    }

    #[test]
    fn empty_table_passes_everything_through() {
        let table = MappingTable::new();
        let resolver = TableResolver::new(&table, &StdHostFs);
        assert_eq!(
            resolver.resolve(Path::new("/any/path"), Access::Create),
            Resolution::PassThrough
        );
        assert_eq!(resolver.list_dir(Path::new("/any")), None);
    }

    #[test]
    fn relative_paths_pass_through() {
        let fx = Fixture::new();
        let mut table = MappingTable::new();
        table
            .link_file(
                &StdHostFs,
                &fx.p("game/config.ini"),
                &fx.p("config.ini"),
                LinkFlags::empty(),
            )
            .unwrap();
        let resolver = TableResolver::new(&table, &StdHostFs);
        assert!(resolver
            .resolve(Path::new("game/config.ini"), Access::Read)
            .is_pass_through());
    }

    #[test]
    fn reverse_maps_real_paths_into_virtual_view() {
        let fx = Fixture::new();
        let mut table = MappingTable::new();
        table
            .link_directory_static(
                &StdHostFs,
                &fx.p("game/data"),
                &fx.p("mods/a"),
                LinkFlags::RECURSIVE,
            )
            .unwrap();
        let inverse = table.inverse();
        let resolver = TableResolver::new(&table, &StdHostFs).with_inverse(&inverse);
        assert_eq!(
            resolver.reverse(&fx.p("mods/a/textures/sky.dds")),
            Some(fx.p("game/data/textures/sky.dds"))
        );
        assert_eq!(resolver.reverse(&fx.p("config.ini")), None);
    }

    #[test]
    fn monitored_lookups_consult_the_host_live() {
        let mut host = MockHostFs::new();
        host.expect_kind().returning(|path| {
            if path == Path::new("/real") {
                Some(EntryKind::Directory)
            } else if path == Path::new("/real/appears.txt") {
                Some(EntryKind::File)
            } else {
                None
            }
        });
        host.expect_read_dir()
            .returning(|_| Ok(vec![ListingEntry::new("appears.txt", false)]));

        let mut table = MappingTable::new();
        table
            .link_directory_static(
                &host,
                Path::new("/virtual"),
                Path::new("/real"),
                LinkFlags::MONITOR_CHANGES,
            )
            .unwrap();
        let resolver = TableResolver::new(&table, &host);
        assert_eq!(
            resolver.resolve(Path::new("/virtual/appears.txt"), Access::Read),
            Resolution::Redirected(PathBuf::from("/real/appears.txt"))
        );
        assert_eq!(
            resolver.resolve(Path::new("/virtual/gone.txt"), Access::Read),
            Resolution::PassThrough
        );
        assert_eq!(
            resolver.list_dir(Path::new("/virtual")),
            Some(vec![ListingEntry::new("appears.txt", false)])
        );
    }
}
