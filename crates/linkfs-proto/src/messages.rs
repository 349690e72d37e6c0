// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Region payload types
//!
//! Strings and paths travel as `Vec<u8>`; SSZ has no string type and paths are
//! not guaranteed to be UTF-8.

use ssz_derive::{Decode, Encode};

/// Main region: session parameters, mapping table and injection rules.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct RegionSnapshot {
    pub version: u32,
    pub generation: u64,
    pub owner_pid: u32,
    pub parameters: WireParameters,
    pub links: Vec<WireLink>,
    pub blacklist: Vec<Vec<u8>>,
    pub force_loads: Vec<WireForceLoad>,
}

/// Session parameters as stored in the region.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct WireParameters {
    pub instance_name: Vec<u8>,
    pub shm_name: Vec<u8>,
    pub inverse_shm_name: Vec<u8>,
    pub debug_mode: bool,
    pub log_level: u8,
    pub crash_dumps_type: u8,
    pub crash_dumps_path: Vec<u8>,
    pub name_truncated: bool,
}

/// One link entry.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct WireLink {
    pub virtual_path: Vec<u8>,
    pub real_path: Vec<u8>,
    pub flags: u32,
    pub is_dir: bool,
    /// Listing captured at link time; absent for file and monitored links.
    pub captured: Option<Vec<WireCapturedEntry>>,
}

#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct WireCapturedEntry {
    pub rel_path: Vec<u8>,
    pub is_dir: bool,
}

#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct WireForceLoad {
    pub process_name: Vec<u8>,
    pub library_path: Vec<u8>,
}

/// Inverse region: real-to-virtual translations.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct InverseSnapshot {
    pub version: u32,
    pub generation: u64,
    pub entries: Vec<WireInverseEntry>,
}

#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct WireInverseEntry {
    pub real_path: Vec<u8>,
    pub virtual_path: Vec<u8>,
    pub is_dir: bool,
}
