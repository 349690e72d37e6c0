// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-process interception state.
//!
//! The state is built once when the library is loaded. Every hook reads the
//! current mapping through [`RegionReader`], which only re-decodes after a
//! writer published a new region. Anything that cannot be read right now
//! resolves as pass-through.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};

use linkfs_core::path::normalize;
use linkfs_core::{
    Access, InjectionEnv, LinkfsResult, ListingEntry, PathResolver, Resolution, StdHostFs,
    TableResolver,
};
use linkfs_shm::{InstanceChannel, LoadedRegion, RegionReader, RuntimeDir};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn, Dispatch};

use crate::guard::HookGuard;

pub(crate) const COMPONENT: &str = "linkfs-hooks";

static SHIM: OnceCell<Shim> = OnceCell::new();

// Held for writing across fork() so the child never inherits a lock taken
// by a thread that does not exist there. Readers hold it only while working
// on the shim's own state, never across a real call.
static FORK_LOCK: RwLock<()> = RwLock::new(());

/// Where a hooked call should go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Keep,
    Real(PathBuf),
    /// A virtual directory, served from the channel's empty placeholder.
    Placeholder(PathBuf),
}

impl Target {
    /// Path for calls that look an entry up (open, stat, list, chdir).
    pub fn lookup(&self) -> Option<&Path> {
        match self {
            Target::Keep => None,
            Target::Real(path) | Target::Placeholder(path) => Some(path),
        }
    }

    /// Path for calls that change the entry itself (unlink, rmdir, rename).
    pub fn mutation(&self) -> Option<&Path> {
        match self {
            Target::Real(path) => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct VirtualCwd {
    virtual_path: PathBuf,
    real_path: PathBuf,
}

pub struct Shim {
    pid: AtomicU32,
    env: InjectionEnv,
    channel: InstanceChannel,
    reader: RegionReader,
    dispatch: Option<Dispatch>,
    cwd: Mutex<Option<VirtualCwd>>,
}

impl Shim {
    /// Joins the channel named by `env` as `pid`.
    ///
    /// Returns `None` without attaching when `exe` is blacklisted.
    pub fn start(env: InjectionEnv, exe: &Path, pid: u32) -> LinkfsResult<Option<Self>> {
        let runtime = RuntimeDir::at(&env.runtime_dir);
        let channel = InstanceChannel::open_system(&runtime, &env.shm_name)?;
        let reader = RegionReader::new(channel.dir());
        let region = reader.load_fresh()?;
        if region.blacklist.is_blacklisted(exe) {
            return Ok(None);
        }

        channel.attach(pid)?;
        let dispatch = if env.log {
            linkfs_logging::file_dispatch(
                COMPONENT,
                region.params.log_level,
                &channel.session_log_path(),
            )
            .ok()
        } else {
            None
        };

        let shim = Self {
            pid: AtomicU32::new(pid),
            env,
            channel,
            reader,
            dispatch,
            cwd: Mutex::new(None),
        };
        shim.log(|| {
            info!(
                pid,
                exe = %exe.display(),
                instance = %region.params.instance_name,
                links = region.table.len(),
                "attached"
            )
        });
        Ok(Some(shim))
    }

    pub fn pid(&self) -> u32 {
        self.pid.load(Ordering::Relaxed)
    }

    /// Runs `f` with the session log as the active subscriber.
    pub fn log(&self, f: impl FnOnce()) {
        if let Some(dispatch) = &self.dispatch {
            tracing::dispatcher::with_default(dispatch, f);
        }
    }

    fn region(&self) -> Option<Arc<LoadedRegion>> {
        self.reader.load()
    }

    /// Absolute virtual form of `path`; relative paths are taken against the
    /// virtual working directory.
    pub fn absolute(&self, path: &Path) -> Option<PathBuf> {
        if path.is_absolute() {
            return normalize(path, None).ok();
        }
        let base = self.virtual_cwd()?;
        normalize(path, Some(&base)).ok()
    }

    /// Resolves an absolute virtual path.
    pub fn resolve(&self, path: &Path, access: Access) -> Target {
        let Some(region) = self.region() else {
            return Target::Keep;
        };
        let resolver = TableResolver::new(&region.table, &StdHostFs).with_inverse(&region.inverse);
        let target = match resolver.resolve(path, access) {
            Resolution::PassThrough => Target::Keep,
            Resolution::Redirected(real) => {
                if access == Access::Create {
                    ensure_parent(&real);
                }
                Target::Real(real)
            }
            Resolution::VirtualDirectory => Target::Placeholder(region.placeholder_dir.clone()),
        };
        if target != Target::Keep {
            self.log(|| tracing::trace!(path = %path.display(), ?target, ?access, "redirect"));
        }
        target
    }

    /// Merged listing of an absolute virtual path.
    pub fn list_dir(&self, path: &Path) -> Option<Vec<ListingEntry>> {
        let region = self.region()?;
        TableResolver::new(&region.table, &StdHostFs).list_dir(path)
    }

    /// Virtual path of a real path.
    pub fn reverse(&self, real: &Path) -> Option<PathBuf> {
        let region = self.region()?;
        TableResolver::new(&region.table, &StdHostFs)
            .with_inverse(&region.inverse)
            .reverse(real)
    }

    /// Records a chdir into a mapped directory.
    pub fn set_cwd(&self, virtual_path: PathBuf, real_path: PathBuf) {
        *self.cwd.lock().unwrap_or_else(PoisonError::into_inner) = Some(VirtualCwd {
            virtual_path,
            real_path,
        });
    }

    pub fn clear_cwd(&self) {
        *self.cwd.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Virtual view of the real working directory `real`.
    pub fn virtual_cwd_of(&self, real: &Path) -> Option<PathBuf> {
        {
            let cwd = self.cwd.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cwd) = cwd.as_ref().filter(|cwd| cwd.real_path == real) {
                return Some(cwd.virtual_path.clone());
            }
        }
        self.reverse(real)
    }

    fn virtual_cwd(&self) -> Option<PathBuf> {
        let real = std::env::current_dir().ok()?;
        Some(self.virtual_cwd_of(&real).unwrap_or(real))
    }

    /// Prepares the environment of an image about to be executed.
    ///
    /// `candidates` are the names the image is known by (the path as given
    /// and its redirection). Returns true when the image is blacklisted, in
    /// which case the injection has been stripped from `env`.
    pub fn exec_env(&self, candidates: &[&Path], env: &mut Vec<(OsString, OsString)>) -> bool {
        let Some(region) = self.region() else {
            self.env.apply(env, &[]);
            return false;
        };

        if let Some(name) = candidates
            .iter()
            .find_map(|exe| region.blacklist.matching(exe))
        {
            InjectionEnv::strip(env, Some(&self.env.shim_path));
            self.log(|| debug!(?candidates, blacklisted = name, "exec without injection"));
            return true;
        }

        let mut libraries: Vec<&Path> = Vec::new();
        for exe in candidates {
            for library in region.force_loads.libraries_for(exe) {
                if !libraries.contains(&library) {
                    libraries.push(library);
                }
            }
        }
        self.env.apply(env, &libraries);
        self.log(|| debug!(?candidates, forced = libraries.len(), "exec with injection"));
        false
    }

    /// Registers another process (a spawned child) with the channel.
    pub fn attach(&self, pid: u32) {
        if let Err(err) = self.channel.attach(pid) {
            self.log(|| warn!(pid, %err, "attach failed"));
        }
    }

    /// Leaves the channel; the last live participant removes it.
    pub fn detach(&self) {
        let pid = self.pid();
        match self.channel.detach(pid) {
            Ok(removed) => self.log(|| debug!(pid, removed, "detached")),
            Err(err) => self.log(|| warn!(pid, %err, "detach failed")),
        }
    }

    /// Leaves the process registry while keeping the channel, even when this
    /// was its last participant. Undone by [`Shim::attach`].
    pub fn suspend(&self) {
        let pid = self.pid();
        match self.channel.unregister(pid) {
            Ok(()) => self.log(|| debug!(pid, "suspended")),
            Err(err) => self.log(|| warn!(pid, %err, "suspend failed")),
        }
    }

    /// Called in the child right after fork.
    pub fn after_fork(&self, pid: u32) {
        self.pid.store(pid, Ordering::Relaxed);
        self.reader.invalidate();
        self.attach(pid);
    }
}

fn ensure_parent(real: &Path) {
    if let Some(parent) = real.parent() {
        if !parent.exists() {
            let _ = fs::create_dir_all(parent);
        }
    }
}

/// Loads the state from the environment contract. Runs once, at load time.
pub fn init() {
    let _guard = HookGuard::new();
    let Some(env) = InjectionEnv::from_vars(|name| std::env::var_os(name)) else {
        return;
    };
    let exe = std::env::current_exe().unwrap_or_default();
    let log = env.log;
    match Shim::start(env, &exe, std::process::id()) {
        Ok(Some(shim)) => {
            let _ = SHIM.set(shim);
        }
        Ok(None) => {}
        Err(err) if log => eprintln!("[{COMPONENT}] not attached: {err}"),
        Err(_) => {}
    }
}

pub fn shutdown() {
    if let Some(shim) = SHIM.get() {
        let _guard = HookGuard::new();
        shim.detach();
    }
}

pub fn active() -> Option<&'static Shim> {
    SHIM.get()
}

/// Runs `f` on the shared side of the fork lock; `None` while a fork is in
/// progress. Sections must not nest and must not make the hooked call itself.
pub fn quiesced<R>(f: impl FnOnce() -> R) -> Option<R> {
    let _shared = FORK_LOCK.try_read().ok()?;
    Some(f())
}

pub fn fork_write() -> RwLockWriteGuard<'static, ()> {
    FORK_LOCK.write().unwrap_or_else(PoisonError::into_inner)
}
