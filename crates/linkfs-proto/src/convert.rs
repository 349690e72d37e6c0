// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Conversions between core types and their wire form

use std::path::{Path, PathBuf};

use linkfs_core::{
    CapturedTree, CrashDumpsType, ExecutableBlacklist, ForceLoad, ForceLoadTable, InverseEntry,
    InverseTable, LinkEntry, LinkFlags, LinkKind, LogLevel, MappingTable, SessionParameters,
    REGION_VERSION,
};

use crate::messages::*;
use crate::validation::{validate_inverse, validate_region, ValidationError};

#[cfg(unix)]
pub fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
pub fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
pub fn path_to_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(not(unix))]
pub fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

fn bytes_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl WireParameters {
    pub fn from_params(params: &SessionParameters) -> Self {
        Self {
            instance_name: params.instance_name.as_bytes().to_vec(),
            shm_name: params.shm_name.as_bytes().to_vec(),
            inverse_shm_name: params.inverse_shm_name.as_bytes().to_vec(),
            debug_mode: params.debug_mode,
            log_level: params.log_level.as_u8(),
            crash_dumps_type: params.crash_dumps_type.as_u8(),
            crash_dumps_path: path_to_bytes(&params.crash_dumps_path),
            name_truncated: params.name_truncated,
        }
    }

    pub fn to_params(&self) -> Result<SessionParameters, ValidationError> {
        let log_level = LogLevel::from_u8(self.log_level)
            .ok_or_else(|| ValidationError::Schema(format!("unknown log level {}", self.log_level)))?;
        let crash_dumps_type = CrashDumpsType::from_u8(self.crash_dumps_type).ok_or_else(|| {
            ValidationError::Schema(format!(
                "unknown crash dump type {}",
                self.crash_dumps_type
            ))
        })?;
        Ok(SessionParameters {
            instance_name: bytes_to_string(&self.instance_name),
            shm_name: bytes_to_string(&self.shm_name),
            inverse_shm_name: bytes_to_string(&self.inverse_shm_name),
            debug_mode: self.debug_mode,
            log_level,
            crash_dumps_type,
            crash_dumps_path: bytes_to_path(&self.crash_dumps_path),
            name_truncated: self.name_truncated,
        })
    }
}

impl WireLink {
    pub fn from_entry(entry: &LinkEntry) -> Self {
        Self {
            virtual_path: path_to_bytes(&entry.virtual_path),
            real_path: path_to_bytes(&entry.real_path),
            flags: entry.flags.bits(),
            is_dir: entry.is_dir(),
            captured: entry.captured.as_ref().map(|tree| {
                tree.iter()
                    .map(|(rel, is_dir)| WireCapturedEntry {
                        rel_path: path_to_bytes(rel),
                        is_dir,
                    })
                    .collect()
            }),
        }
    }

    pub fn to_entry(&self) -> LinkEntry {
        LinkEntry {
            virtual_path: bytes_to_path(&self.virtual_path),
            real_path: bytes_to_path(&self.real_path),
            kind: if self.is_dir {
                LinkKind::Directory
            } else {
                LinkKind::File
            },
            flags: LinkFlags::from_bits_truncate(self.flags),
            captured: self.captured.as_ref().map(|entries| {
                CapturedTree::from_entries(
                    entries
                        .iter()
                        .map(|e| (bytes_to_path(&e.rel_path), e.is_dir)),
                )
            }),
        }
    }
}

impl RegionSnapshot {
    /// Snapshot of a fresh session with an empty table.
    pub fn new(owner_pid: u32, params: &SessionParameters) -> Self {
        Self {
            version: REGION_VERSION,
            generation: 0,
            owner_pid,
            parameters: WireParameters::from_params(params),
            links: Vec::new(),
            blacklist: Vec::new(),
            force_loads: Vec::new(),
        }
    }

    pub fn parameters(&self) -> Result<SessionParameters, ValidationError> {
        self.parameters.to_params()
    }

    pub fn table(&self) -> MappingTable {
        MappingTable::from_parts(self.generation, self.links.iter().map(WireLink::to_entry))
    }

    /// Replaces the links with the content of `table`.
    pub fn set_table(&mut self, table: &MappingTable) {
        self.links = table.iter().map(WireLink::from_entry).collect();
        self.generation = table.generation();
    }

    pub fn blacklist(&self) -> ExecutableBlacklist {
        self.blacklist
            .iter()
            .map(|name| bytes_to_string(name))
            .collect()
    }

    pub fn set_blacklist(&mut self, blacklist: &ExecutableBlacklist) {
        self.blacklist = blacklist
            .names()
            .iter()
            .map(|name| name.as_bytes().to_vec())
            .collect();
    }

    pub fn force_loads(&self) -> ForceLoadTable {
        self.force_loads
            .iter()
            .map(|entry| ForceLoad {
                process_name: bytes_to_string(&entry.process_name),
                library_path: bytes_to_path(&entry.library_path),
            })
            .collect()
    }

    pub fn set_force_loads(&mut self, table: &ForceLoadTable) {
        self.force_loads = table
            .entries()
            .iter()
            .map(|entry| WireForceLoad {
                process_name: entry.process_name.as_bytes().to_vec(),
                library_path: path_to_bytes(&entry.library_path),
            })
            .collect();
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_region(self)
    }
}

impl InverseSnapshot {
    pub fn from_table(table: &MappingTable) -> Self {
        Self {
            version: REGION_VERSION,
            generation: table.generation(),
            entries: table
                .inverse()
                .entries()
                .iter()
                .map(|entry| WireInverseEntry {
                    real_path: path_to_bytes(&entry.real_path),
                    virtual_path: path_to_bytes(&entry.virtual_path),
                    is_dir: entry.kind == LinkKind::Directory,
                })
                .collect(),
        }
    }

    pub fn inverse(&self) -> InverseTable {
        InverseTable::new(self.entries.iter().map(|entry| InverseEntry {
            real_path: bytes_to_path(&entry.real_path),
            virtual_path: bytes_to_path(&entry.virtual_path),
            kind: if entry.is_dir {
                LinkKind::Directory
            } else {
                LinkKind::File
            },
        }))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_inverse(self)
    }
}
