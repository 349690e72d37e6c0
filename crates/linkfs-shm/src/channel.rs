// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The instance channel: one directory per session.
//!
//! ```text
//! <runtime>/<shm_name>/
//!     region                 main region (parameters, links, injection rules)
//!     <inverse_shm_name>     inverse region
//!     lock                   writers hold this while publishing
//!     procs/<pid>            attached process markers
//!     placeholder/           empty directory served for virtual directories
//!     session.log            shared log sink
//! ```
//!
//! Channels are built in a staging directory and renamed into place while
//! holding the runtime-wide creation lock, so a channel is either absent or
//! complete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use linkfs_core::{LinkfsError, LinkfsResult, MappingTable, SessionParameters};
use linkfs_proto::{
    decode_region, encode_inverse, encode_region, InverseSnapshot, RegionSnapshot,
};
use tracing::{debug, info, warn};

use crate::liveness::{Liveness, SystemLiveness};
use crate::lock::RegionLock;
use crate::region::RegionFile;
use crate::registry::{ProcessList, ProcessRegistry};
use crate::runtime::RuntimeDir;

pub const REGION_FILE: &str = "region";
pub const LOCK_FILE: &str = "lock";
pub const PROCS_DIR: &str = "procs";
pub const PLACEHOLDER_DIR: &str = "placeholder";
pub const SESSION_LOG_FILE: &str = "session.log";

pub struct InstanceChannel {
    runtime: RuntimeDir,
    dir: PathBuf,
    params: SessionParameters,
    region: RegionFile,
    inverse: RegionFile,
    registry: ProcessRegistry,
    liveness: Arc<dyn Liveness>,
}

impl std::fmt::Debug for InstanceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceChannel")
            .field("dir", &self.dir)
            .field("instance", &self.params.instance_name)
            .finish_non_exhaustive()
    }
}

fn read_snapshot(region: &RegionFile) -> LinkfsResult<RegionSnapshot> {
    let bytes = region.read()?;
    Ok(decode_region(&bytes)?)
}

/// A channel is stale when neither its owner nor any attached process lives.
fn is_stale(dir: &Path, liveness: &dyn Liveness) -> bool {
    let owner_alive = read_snapshot(&RegionFile::new(dir.join(REGION_FILE)))
        .map(|snapshot| liveness.is_alive(snapshot.owner_pid))
        .unwrap_or(false);
    if owner_alive {
        return false;
    }
    ProcessRegistry::new(dir.join(PROCS_DIR))
        .live_pids(liveness)
        .map(|pids| pids.is_empty())
        .unwrap_or(true)
}

impl InstanceChannel {
    fn layout(
        runtime: &RuntimeDir,
        params: SessionParameters,
        liveness: Arc<dyn Liveness>,
    ) -> Self {
        let dir = runtime.channel_dir(&params.shm_name);
        Self {
            runtime: runtime.clone(),
            region: RegionFile::new(dir.join(REGION_FILE)),
            inverse: RegionFile::new(dir.join(&params.inverse_shm_name)),
            registry: ProcessRegistry::new(dir.join(PROCS_DIR)),
            dir,
            params,
            liveness,
        }
    }

    /// Allocates a new channel owned and attached by `owner_pid`.
    ///
    /// Fails with `InstanceExists` while a live channel of the same name
    /// exists; a stale one is removed first.
    pub fn create(
        runtime: &RuntimeDir,
        params: &SessionParameters,
        owner_pid: u32,
        liveness: Arc<dyn Liveness>,
    ) -> LinkfsResult<Self> {
        params.validate()?;
        fs::create_dir_all(runtime.root())?;
        let _create = RegionLock::acquire(&runtime.create_lock_path())?;

        let channel = Self::layout(runtime, params.clone(), liveness);
        if channel.dir.exists() {
            if !is_stale(&channel.dir, channel.liveness.as_ref()) {
                return Err(LinkfsError::InstanceExists(params.instance_name.clone()));
            }
            info!(dir = %channel.dir.display(), "reclaiming stale channel");
            fs::remove_dir_all(&channel.dir)?;
        }

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(runtime.root())?;
        let stage = staging.path();
        fs::write(
            stage.join(REGION_FILE),
            encode_region(&RegionSnapshot::new(owner_pid, params)),
        )?;
        fs::write(
            stage.join(&params.inverse_shm_name),
            encode_inverse(&InverseSnapshot::from_table(&MappingTable::new())),
        )?;
        fs::write(stage.join(LOCK_FILE), b"")?;
        fs::write(stage.join(SESSION_LOG_FILE), b"")?;
        fs::create_dir(stage.join(PLACEHOLDER_DIR))?;
        fs::create_dir(stage.join(PROCS_DIR))?;
        ProcessRegistry::new(stage.join(PROCS_DIR)).register(owner_pid)?;
        fs::rename(stage, &channel.dir)?;

        info!(
            instance = %params.instance_name,
            dir = %channel.dir.display(),
            owner_pid,
            "created channel"
        );
        Ok(channel)
    }

    /// Attaches `pid` to the existing channel named by `params`.
    ///
    /// The returned channel carries the parameters stored in the region,
    /// not the ones passed in.
    pub fn connect(
        runtime: &RuntimeDir,
        params: &SessionParameters,
        pid: u32,
        liveness: Arc<dyn Liveness>,
    ) -> LinkfsResult<Self> {
        let not_found = || LinkfsError::InstanceNotFound(params.instance_name.clone());
        if !runtime.channel_dir(&params.shm_name).is_dir() {
            return Err(not_found());
        }
        let _create = RegionLock::acquire(&runtime.create_lock_path())?;

        let channel = Self::open(runtime, &params.shm_name, liveness)?;
        if channel.params.instance_name != params.instance_name {
            warn!(
                requested = %params.instance_name,
                found = %channel.params.instance_name,
                "channel belongs to another instance"
            );
            return Err(not_found());
        }
        if is_stale(&channel.dir, channel.liveness.as_ref()) {
            warn!(dir = %channel.dir.display(), "refusing to join stale channel");
            return Err(not_found());
        }
        channel.attach(pid)?;
        debug!(instance = %channel.params.instance_name, pid, "connected to channel");
        Ok(channel)
    }

    /// Opens the channel directory without attaching.
    pub fn open(
        runtime: &RuntimeDir,
        shm_name: &str,
        liveness: Arc<dyn Liveness>,
    ) -> LinkfsResult<Self> {
        let dir = runtime.channel_dir(shm_name);
        let region = RegionFile::new(dir.join(REGION_FILE));
        let snapshot = match read_snapshot(&region) {
            Err(LinkfsError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                return Err(LinkfsError::InstanceNotFound(shm_name.to_string()))
            }
            other => other?,
        };
        let params = snapshot.parameters()?;
        Ok(Self::layout(runtime, params, liveness))
    }

    pub fn open_system(runtime: &RuntimeDir, shm_name: &str) -> LinkfsResult<Self> {
        Self::open(runtime, shm_name, Arc::new(SystemLiveness))
    }

    pub fn params(&self) -> &SessionParameters {
        &self.params
    }

    pub fn runtime(&self) -> &RuntimeDir {
        &self.runtime
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn region_file(&self) -> &RegionFile {
        &self.region
    }

    pub fn inverse_file(&self) -> &RegionFile {
        &self.inverse
    }

    pub fn placeholder_dir(&self) -> PathBuf {
        self.dir.join(PLACEHOLDER_DIR)
    }

    pub fn session_log_path(&self) -> PathBuf {
        self.dir.join(SESSION_LOG_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn snapshot(&self) -> LinkfsResult<RegionSnapshot> {
        read_snapshot(&self.region)
    }

    /// Read-modify-publish under the channel lock.
    ///
    /// `change` edits a private copy; when it fails nothing is published.
    pub fn update<F>(&self, change: F) -> LinkfsResult<RegionSnapshot>
    where
        F: FnOnce(&mut RegionSnapshot) -> LinkfsResult<()>,
    {
        let _lock = RegionLock::acquire(&self.lock_path())?;
        let mut snapshot = self.snapshot()?;
        change(&mut snapshot)?;
        snapshot.validate()?;

        self.inverse
            .publish(&encode_inverse(&InverseSnapshot::from_table(&snapshot.table())))?;
        self.region.publish(&encode_region(&snapshot))?;
        debug!(
            instance = %self.params.instance_name,
            generation = snapshot.generation,
            links = snapshot.links.len(),
            "published region"
        );
        Ok(snapshot)
    }

    pub fn attach(&self, pid: u32) -> LinkfsResult<()> {
        self.registry.register(pid)?;
        Ok(())
    }

    pub fn is_attached(&self, pid: u32) -> bool {
        self.registry.is_registered(pid)
    }

    /// Drops `pid` from the registry without removing the channel.
    pub fn unregister(&self, pid: u32) -> LinkfsResult<()> {
        self.registry.unregister(pid)?;
        Ok(())
    }

    /// Detaches `pid`; returns true when this removed the channel because no
    /// live participant remained.
    pub fn detach(&self, pid: u32) -> LinkfsResult<bool> {
        self.registry.unregister(pid)?;
        let _create = RegionLock::acquire(&self.runtime.create_lock_path())?;
        if !self.dir.exists() {
            return Ok(true);
        }
        if self.registry.live_pids(self.liveness.as_ref())?.is_empty() {
            fs::remove_dir_all(&self.dir)?;
            info!(instance = %self.params.instance_name, "removed channel");
            return Ok(true);
        }
        Ok(false)
    }

    /// Live attached processes; dead entries are pruned on the way.
    pub fn process_list(&self) -> LinkfsResult<ProcessList> {
        match self.registry.list(self.liveness.as_ref()) {
            Ok(list) => Ok(list),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(ProcessList::default()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::MockLiveness;
    use linkfs_core::{LinkFlags, StdHostFs};

    fn always_alive() -> Arc<dyn Liveness> {
        let mut liveness = MockLiveness::new();
        liveness.expect_is_alive().return_const(true);
        Arc::new(liveness)
    }

    fn never_alive() -> Arc<dyn Liveness> {
        let mut liveness = MockLiveness::new();
        liveness.expect_is_alive().return_const(false);
        Arc::new(liveness)
    }

    #[test]
    fn create_lays_out_channel() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RuntimeDir::at(root.path());
        let params = SessionParameters::named("layout");

        let channel = InstanceChannel::create(&runtime, &params, 100, always_alive()).unwrap();
        assert!(channel.dir().join(REGION_FILE).is_file());
        assert!(channel.dir().join("layout_inverse_v1").is_file());
        assert!(channel.placeholder_dir().is_dir());
        assert!(channel.session_log_path().is_file());
        assert!(channel.is_attached(100));
        assert_eq!(channel.snapshot().unwrap().owner_pid, 100);
    }

    #[test]
    fn second_create_fails_while_live() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RuntimeDir::at(root.path());
        let params = SessionParameters::named("twice");

        let _first = InstanceChannel::create(&runtime, &params, 1, always_alive()).unwrap();
        let err = InstanceChannel::create(&runtime, &params, 2, always_alive()).unwrap_err();
        assert!(matches!(err, LinkfsError::InstanceExists(_)));
    }

    #[test]
    fn stale_channel_is_reclaimed_on_create() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RuntimeDir::at(root.path());
        let params = SessionParameters::named("stale");

        InstanceChannel::create(&runtime, &params, 1, always_alive()).unwrap();
        let fresh = InstanceChannel::create(&runtime, &params, 2, never_alive()).unwrap();
        assert_eq!(fresh.snapshot().unwrap().owner_pid, 2);
    }

    #[test]
    fn connect_refuses_missing_and_stale() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RuntimeDir::at(root.path());
        let params = SessionParameters::named("join");

        let err = InstanceChannel::connect(&runtime, &params, 5, always_alive()).unwrap_err();
        assert!(matches!(err, LinkfsError::InstanceNotFound(_)));

        InstanceChannel::create(&runtime, &params, 1, always_alive()).unwrap();
        let err = InstanceChannel::connect(&runtime, &params, 5, never_alive()).unwrap_err();
        assert!(matches!(err, LinkfsError::InstanceNotFound(_)));

        let joined = InstanceChannel::connect(&runtime, &params, 5, always_alive()).unwrap();
        assert!(joined.is_attached(5));
    }

    #[test]
    fn connect_refuses_a_channel_of_another_name() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RuntimeDir::at(root.path());
        let owner = SessionParameters::named("owner");
        InstanceChannel::create(&runtime, &owner, 1, always_alive()).unwrap();

        // A request whose region name points at the owner's channel.
        let mut other = SessionParameters::named("other");
        other.shm_name = owner.shm_name.clone();
        let err = InstanceChannel::connect(&runtime, &other, 5, always_alive()).unwrap_err();
        assert!(matches!(err, LinkfsError::InstanceNotFound(name) if name == "other"));

        let joined = InstanceChannel::connect(&runtime, &owner, 5, always_alive()).unwrap();
        assert_eq!(joined.params().instance_name, "owner");
    }

    #[test]
    fn connect_rejects_other_region_version() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RuntimeDir::at(root.path());
        let params = SessionParameters::named("versioned");
        let channel = InstanceChannel::create(&runtime, &params, 1, always_alive()).unwrap();

        let mut bytes = channel.region_file().read().unwrap();
        bytes[5..9].copy_from_slice(&9u32.to_le_bytes());
        channel.region_file().publish(&bytes).unwrap();

        let err = InstanceChannel::connect(&runtime, &params, 5, always_alive()).unwrap_err();
        assert!(matches!(err, LinkfsError::VersionMismatch { found: 9, .. }));
    }

    #[test]
    fn failed_update_publishes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RuntimeDir::at(root.path());
        let channel = InstanceChannel::create(
            &runtime,
            &SessionParameters::named("atomic"),
            1,
            always_alive(),
        )
        .unwrap();
        let before = channel.region_file().identity().unwrap();

        let err = channel
            .update(|snapshot| {
                let mut table = snapshot.table();
                table.link_file(
                    &StdHostFs,
                    Path::new("/virtual/x"),
                    &root.path().join("missing"),
                    LinkFlags::empty(),
                )?;
                snapshot.set_table(&table);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, LinkfsError::DestinationMissing(_)));
        assert_eq!(channel.region_file().identity().unwrap(), before);
    }

    #[test]
    fn last_detach_removes_channel() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RuntimeDir::at(root.path());
        let params = SessionParameters::named("lifetime");
        let owner = InstanceChannel::create(&runtime, &params, 1, always_alive()).unwrap();
        let guest = InstanceChannel::connect(&runtime, &params, 2, always_alive()).unwrap();

        assert!(!owner.detach(1).unwrap());
        assert!(owner.dir().exists());
        assert!(guest.detach(2).unwrap());
        assert!(!guest.dir().exists());
        assert!(guest.process_list().unwrap().is_empty());
    }

    #[test]
    fn unregister_never_removes_the_channel() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RuntimeDir::at(root.path());
        let params = SessionParameters::named("suspend");
        let owner = InstanceChannel::create(&runtime, &params, 1, always_alive()).unwrap();

        owner.unregister(1).unwrap();
        assert!(!owner.is_attached(1));
        assert!(owner.dir().exists());

        owner.attach(1).unwrap();
        assert!(owner.detach(1).unwrap());
        assert!(!owner.dir().exists());
    }
}
