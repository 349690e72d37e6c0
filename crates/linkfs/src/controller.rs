// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The session controller.
//!
//! A [`Controller`] owns at most one session at a time. All methods take
//! `&self`; the session, the blacklist and the forced loads sit behind one
//! mutex so the controller can be shared between threads.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use linkfs_core::{
    apply_entries, CrashDumpsType, ExecutableBlacklist, ForceLoadTable, InjectionEnv, LinkfsError,
    LinkfsResult, LinkFlags, Mapping, MappingTable, SessionParameters, StdHostFs,
};
use linkfs_logging::crash::{self, CrashDumpSettings};
use linkfs_logging::{LogFormat, SinkMode};
use linkfs_shm::{InstanceChannel, Liveness, ProcessList, RuntimeDir, SystemLiveness};
use tracing::{debug, info, warn};

use crate::launch::{self, LaunchPlan};

pub const COMPONENT: &str = "linkfs";

struct Session {
    channel: InstanceChannel,
    pid: u32,
}

#[derive(Default)]
struct State {
    session: Option<Session>,
    blacklist: ExecutableBlacklist,
    force_loads: ForceLoadTable,
    log_to_session: bool,
}

pub struct Controller {
    runtime: RuntimeDir,
    liveness: Arc<dyn Liveness>,
    shim_path: Option<PathBuf>,
    state: Mutex<State>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(RuntimeDir::from_env())
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("runtime", &self.runtime.root())
            .field("instance", &self.current_vfs_name())
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(runtime: RuntimeDir) -> Self {
        Self {
            runtime,
            liveness: Arc::new(SystemLiveness),
            shim_path: None,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_liveness(mut self, liveness: Arc<dyn Liveness>) -> Self {
        self.liveness = liveness;
        self
    }

    /// Interception library used by [`Controller::create_process_hooked`]
    /// when `LINKFS_SHIM_PATH` is not set.
    pub fn with_shim_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.shim_path = Some(path.into());
        self
    }

    pub fn runtime(&self) -> &RuntimeDir {
        &self.runtime
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Routes this process's log output to stderr (`to_local`) or to the
    /// session log shared by every attached process.
    ///
    /// Installs the global subscriber if nobody did yet. The session's log
    /// level is applied once a session is created or joined.
    pub fn init_logging(&self, to_local: bool) -> LinkfsResult<()> {
        let handle = match linkfs_logging::handle() {
            Some(handle) => handle,
            None => linkfs_logging::init(COMPONENT, linkfs_logging::Level::INFO, LogFormat::Plaintext)
                .map_err(|err| LinkfsError::Io(std::io::Error::other(err.to_string())))?,
        };
        let mode = if to_local { SinkMode::Local } else { SinkMode::Session };
        handle.sink().set_mode(mode);

        let mut state = self.lock();
        state.log_to_session = !to_local;
        if let Some(session) = &state.session {
            bind_logging(&session.channel);
        }
        debug!(?mode, "logging initialized");
        Ok(())
    }

    /// Creates a session and joins it as owner.
    ///
    /// A session this controller already holds is left first.
    pub fn create_vfs(&self, params: &SessionParameters) -> LinkfsResult<()> {
        let mut state = self.lock();
        leave(&mut state);

        let pid = std::process::id();
        let channel =
            InstanceChannel::create(&self.runtime, params, pid, Arc::clone(&self.liveness))?;
        if let Err(err) = publish_rules(&channel, &state) {
            let _ = channel.detach(pid);
            return Err(err);
        }
        self.enter(&mut state, channel, pid);
        Ok(())
    }

    /// Joins an existing session.
    ///
    /// The session keeps its own blacklist and forced loads; this
    /// controller's entries are added to them.
    pub fn connect_vfs(&self, params: &SessionParameters) -> LinkfsResult<()> {
        let mut state = self.lock();
        leave(&mut state);

        let pid = std::process::id();
        let channel =
            InstanceChannel::connect(&self.runtime, params, pid, Arc::clone(&self.liveness))?;
        let snapshot = channel.snapshot()?;
        for name in snapshot.blacklist().names() {
            state.blacklist.add(name);
        }
        for entry in snapshot.force_loads().entries() {
            state.force_loads.add(&entry.process_name, entry.library_path.clone());
        }
        if let Err(err) = publish_rules(&channel, &state) {
            let _ = channel.detach(pid);
            return Err(err);
        }
        self.enter(&mut state, channel, pid);
        Ok(())
    }

    fn enter(&self, state: &mut State, channel: InstanceChannel, pid: u32) {
        if linkfs_logging::handle().is_some() {
            bind_logging(&channel);
        }
        install_crash_dumps(channel.params());
        info!(
            instance = %channel.params().instance_name,
            shm = %channel.params().shm_name,
            pid,
            "joined session"
        );
        state.session = Some(Session { channel, pid });
    }

    /// Leaves the current session, if any.
    pub fn disconnect_vfs(&self) {
        leave(&mut self.lock());
    }

    /// Instance name of the current session; empty when disconnected.
    pub fn current_vfs_name(&self) -> String {
        self.lock()
            .session
            .as_ref()
            .map(|session| session.channel.params().instance_name.clone())
            .unwrap_or_default()
    }

    pub fn current_params(&self) -> Option<SessionParameters> {
        self.lock()
            .session
            .as_ref()
            .map(|session| session.channel.params().clone())
    }

    /// Live attached processes; empty when disconnected.
    pub fn vfs_process_list(&self) -> LinkfsResult<ProcessList> {
        match &self.lock().session {
            Some(session) => session.channel.process_list(),
            None => Ok(ProcessList::default()),
        }
    }

    /// Current mapping table of the session.
    pub fn mapping_table(&self) -> LinkfsResult<MappingTable> {
        let state = self.lock();
        let session = state.session.as_ref().ok_or(LinkfsError::NotConnected)?;
        Ok(session.channel.snapshot()?.table())
    }

    /// Edits the table under the channel lock; nothing is published when
    /// `change` fails.
    fn edit_table<T, F>(&self, change: F) -> LinkfsResult<T>
    where
        T: Default,
        F: FnOnce(&mut MappingTable) -> LinkfsResult<T>,
    {
        let state = self.lock();
        let session = state.session.as_ref().ok_or(LinkfsError::NotConnected)?;
        let mut value = T::default();
        session.channel.update(|snapshot| {
            let mut table = snapshot.table();
            value = change(&mut table)?;
            snapshot.set_table(&table);
            Ok(())
        })?;
        Ok(value)
    }

    /// Maps the virtual file `source` onto the real file `destination`.
    pub fn virtual_link_file(
        &self,
        source: &Path,
        destination: &Path,
        flags: LinkFlags,
    ) -> LinkfsResult<()> {
        self.edit_table(|table| table.link_file(&StdHostFs, source, destination, flags))
    }

    /// Maps the virtual directory `source` onto the real directory `destination`.
    pub fn virtual_link_directory_static(
        &self,
        source: &Path,
        destination: &Path,
        flags: LinkFlags,
    ) -> LinkfsResult<()> {
        self.edit_table(|table| {
            table.link_directory_static(&StdHostFs, source, destination, flags)
        })
    }

    /// Removes the link at `source`; returns whether there was one.
    pub fn remove_virtual_link(&self, source: &Path) -> LinkfsResult<bool> {
        self.edit_table(|table| table.remove(source))
    }

    pub fn clear_virtual_mappings(&self) -> LinkfsResult<()> {
        self.edit_table(|table| {
            table.clear();
            Ok(())
        })
    }

    /// Replaces the whole table with `mapping`, relative paths taken against
    /// `base`. Either every entry is applied or none is.
    pub fn apply_mapping(&self, mapping: &Mapping, base: &Path) -> LinkfsResult<()> {
        let entries = mapping.resolved(base)?;
        self.edit_table(|table| apply_entries(table, &StdHostFs, &entries))
    }

    pub fn blacklist_executable(&self, name: &str) -> LinkfsResult<()> {
        let mut state = self.lock();
        state.blacklist.add(name);
        mirror_rules(&state)
    }

    pub fn clear_executable_blacklist(&self) -> LinkfsResult<()> {
        let mut state = self.lock();
        state.blacklist.clear();
        mirror_rules(&state)
    }

    pub fn blacklist(&self) -> ExecutableBlacklist {
        self.lock().blacklist.clone()
    }

    pub fn force_load_library(&self, process_name: &str, library_path: &Path) -> LinkfsResult<()> {
        let mut state = self.lock();
        state.force_loads.add(process_name, library_path);
        mirror_rules(&state)
    }

    pub fn clear_library_force_loads(&self) -> LinkfsResult<()> {
        let mut state = self.lock();
        state.force_loads.clear();
        mirror_rules(&state)
    }

    pub fn force_loads(&self) -> ForceLoadTable {
        self.lock().force_loads.clone()
    }

    /// Starts `command_line` as a hooked process of the current session and
    /// returns its pid.
    ///
    /// Blacklisted programs start without injection and are not registered.
    pub fn create_process_hooked(
        &self,
        command_line: &str,
        working_dir: Option<&Path>,
    ) -> LinkfsResult<u32> {
        let state = self.lock();
        let session = state.session.as_ref().ok_or(LinkfsError::NotConnected)?;
        let injection = InjectionEnv {
            runtime_dir: self.runtime.root().to_path_buf(),
            shm_name: session.channel.params().shm_name.clone(),
            instance_name: session.channel.params().instance_name.clone(),
            shim_path: launch::find_shim(self.shim_path.as_deref())?,
            log: true,
        };
        let plan = LaunchPlan::new(
            command_line,
            working_dir,
            launch::current_env(),
            &injection,
            &state.blacklist,
            &state.force_loads,
        )?;

        let pid = plan.spawn()?;
        if plan.blacklisted {
            info!(pid, program = %plan.program, "started blacklisted process unhooked");
        } else {
            session.channel.attach(pid)?;
            info!(pid, program = %plan.program, "started hooked process");
        }
        Ok(pid)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        leave(&mut self.lock());
    }
}

fn leave(state: &mut State) {
    let Some(session) = state.session.take() else {
        return;
    };
    if let Some(handle) = linkfs_logging::handle() {
        handle.sink().detach();
    }
    crash::disable();
    match session.channel.detach(session.pid) {
        Ok(removed) => info!(
            instance = %session.channel.params().instance_name,
            removed,
            "left session"
        ),
        Err(err) => warn!(%err, "detaching from session failed"),
    }
}

fn publish_rules(channel: &InstanceChannel, state: &State) -> LinkfsResult<()> {
    channel.update(|snapshot| {
        snapshot.set_blacklist(&state.blacklist);
        snapshot.set_force_loads(&state.force_loads);
        Ok(())
    })?;
    Ok(())
}

fn mirror_rules(state: &State) -> LinkfsResult<()> {
    match &state.session {
        Some(session) => publish_rules(&session.channel, state),
        None => Ok(()),
    }
}

fn bind_logging(channel: &InstanceChannel) {
    let Some(handle) = linkfs_logging::handle() else {
        return;
    };
    if let Err(err) = handle.sink().attach(&channel.session_log_path()) {
        warn!(%err, "cannot open session log");
    }
    if let Err(err) = handle.set_level(channel.params().log_level) {
        warn!(%err, "cannot apply session log level");
    }
}

fn install_crash_dumps(params: &SessionParameters) {
    if params.crash_dumps_type == CrashDumpsType::None {
        crash::disable();
        return;
    }
    let dir = if params.crash_dumps_path.as_os_str().is_empty() {
        linkfs_config::paths::default_dump_dir()
    } else {
        params.crash_dumps_path.clone()
    };
    crash::install(CrashDumpSettings {
        kind: params.crash_dumps_type,
        dir,
        component: COMPONENT.to_string(),
        summary: Some(format!(
            "instance: {}\nshm: {}\ndebug: {}\nlog level: {}",
            params.instance_name, params.shm_name, params.debug_mode, params.log_level
        )),
    });
}
