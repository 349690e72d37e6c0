// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! linkfs core: mapping table, resolution rules and session parameters
//!
//! This crate is platform independent. It knows nothing about shared regions
//! or symbol interposition; those live in `linkfs-shm` and `linkfs-hooks`.

pub mod error;
pub mod flags;
pub mod host;
pub mod injection;
pub mod mapping;
pub mod params;
pub mod path;
pub mod resolver;
pub mod table;

pub use error::{ErrorKind, LinkfsError, LinkfsResult};
pub use flags::LinkFlags;
pub use host::{EntryKind, HostFs, ListingEntry, PlannedFs, StdHostFs};
pub use injection::{ExecutableBlacklist, ForceLoad, ForceLoadTable, InjectionEnv};
pub use mapping::{apply_entries, Mapping, MappingEntry};
pub use params::{
    CrashDumpsType, LogLevel, SessionParameters, MAX_INSTANCE_NAME_LEN, REGION_VERSION,
};
pub use resolver::{Access, PathResolver, Resolution, TableResolver};
pub use table::{CapturedTree, InverseEntry, InverseTable, LinkEntry, LinkKind, MappingTable};

/// Most process IDs reported by a single process list query.
pub const MAX_PROCESS_LIST_LEN: usize = 64;
