// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Cached view of a channel for hot-path readers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use linkfs_core::{
    ExecutableBlacklist, ForceLoadTable, InverseTable, LinkfsResult, MappingTable,
    SessionParameters,
};
use linkfs_proto::{decode_inverse, decode_region};

use crate::channel::{PLACEHOLDER_DIR, REGION_FILE};
use crate::region::{FileIdentity, RegionFile};

/// Everything a hooked process needs from the channel, decoded.
#[derive(Debug)]
pub struct LoadedRegion {
    pub params: SessionParameters,
    pub owner_pid: u32,
    pub table: MappingTable,
    pub inverse: InverseTable,
    pub blacklist: ExecutableBlacklist,
    pub force_loads: ForceLoadTable,
    pub placeholder_dir: PathBuf,
    identity: (FileIdentity, FileIdentity),
}

/// Re-decodes the channel only when a region file was replaced.
#[derive(Debug)]
pub struct RegionReader {
    dir: PathBuf,
    region: RegionFile,
    cached: Mutex<Option<Arc<LoadedRegion>>>,
}

impl RegionReader {
    pub fn new(channel_dir: impl Into<PathBuf>) -> Self {
        let dir = channel_dir.into();
        Self {
            region: RegionFile::new(dir.join(REGION_FILE)),
            dir,
            cached: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Decodes both regions, bypassing the cache.
    pub fn load_fresh(&self) -> LinkfsResult<LoadedRegion> {
        let (bytes, main_identity) = self.region.read_with_identity()?;
        let snapshot = decode_region(&bytes)?;
        let params = snapshot.parameters()?;

        let inverse_file = RegionFile::new(self.dir.join(&params.inverse_shm_name));
        let (inverse_bytes, inverse_identity) = inverse_file.read_with_identity()?;
        let inverse = decode_inverse(&inverse_bytes)?;

        Ok(LoadedRegion {
            owner_pid: snapshot.owner_pid,
            table: snapshot.table(),
            inverse: inverse.inverse(),
            blacklist: snapshot.blacklist(),
            force_loads: snapshot.force_loads(),
            placeholder_dir: self.dir.join(PLACEHOLDER_DIR),
            identity: (main_identity, inverse_identity),
            params,
        })
    }

    /// Current view, or `None` when the channel cannot be read right now.
    ///
    /// Never blocks: a cache held by another thread also yields `None`.
    pub fn load(&self) -> Option<Arc<LoadedRegion>> {
        let mut cached = self.cached.try_lock().ok()?;
        if let Some(current) = cached.as_ref() {
            if self.is_current(current) {
                return Some(Arc::clone(current));
            }
        }
        let loaded = Arc::new(self.load_fresh().ok()?);
        *cached = Some(Arc::clone(&loaded));
        Some(loaded)
    }

    pub fn invalidate(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
    }

    fn is_current(&self, loaded: &LoadedRegion) -> bool {
        let inverse_file = RegionFile::new(self.dir.join(&loaded.params.inverse_shm_name));
        match (self.region.identity(), inverse_file.identity()) {
            (Ok(main), Ok(inverse)) => (main, inverse) == loaded.identity,
            _ => false,
        }
    }
}
