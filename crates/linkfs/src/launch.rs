// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Hooked process launch.
//!
//! The child starts in its own session with the standard streams on
//! `/dev/null`, and the dynamic loader pulls in the interception library (and
//! any forced libraries) before `main` runs.

use std::ffi::OsString;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use linkfs_core::{ExecutableBlacklist, ForceLoadTable, InjectionEnv, LinkfsError, LinkfsResult};
use tracing::{debug, warn};

/// Overrides the location of the interception library.
pub const SHIM_PATH_ENV: &str = "LINKFS_SHIM_PATH";

/// File name of the interception library next to the binaries.
pub const SHIM_FILE_NAME: &str = "liblinkfs_hooks.so";

/// Everything needed to start one hooked process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(OsString, OsString)>,
    /// The program is blacklisted: it runs without injection and is not
    /// registered with the session.
    pub blacklisted: bool,
}

impl LaunchPlan {
    /// Splits `command_line` shell-style and prepares the child environment
    /// from `base_env`.
    pub fn new(
        command_line: &str,
        working_dir: Option<&Path>,
        base_env: Vec<(OsString, OsString)>,
        injection: &InjectionEnv,
        blacklist: &ExecutableBlacklist,
        force_loads: &ForceLoadTable,
    ) -> LinkfsResult<Self> {
        let mut words = shell_words::split(command_line)
            .map_err(|err| LinkfsError::Launch(format!("cannot parse command line: {err}")))?
            .into_iter();
        let program = words
            .next()
            .ok_or_else(|| LinkfsError::Launch("empty command line".to_string()))?;

        let mut env = base_env;
        let image = Path::new(&program);
        let blacklisted = blacklist.is_blacklisted(image);
        if blacklisted {
            InjectionEnv::strip(&mut env, Some(&injection.shim_path));
        } else {
            injection.apply(&mut env, &force_loads.libraries_for(image));
        }

        Ok(Self {
            program,
            args: words.collect(),
            working_dir: working_dir
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(Path::to_path_buf),
            env,
            blacklisted,
        })
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env_clear()
            .envs(self.env.iter().map(|(name, value)| (name, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid().map_err(io::Error::from)?;
                Ok(())
            });
        }
        command
    }

    /// Starts the process. A detached thread reaps it when it exits.
    pub fn spawn(&self) -> LinkfsResult<u32> {
        let child = self
            .command()
            .spawn()
            .map_err(|err| LinkfsError::Launch(format!("{}: {err}", self.program)))?;
        let pid = child.id();
        debug!(pid, program = %self.program, blacklisted = self.blacklisted, "spawned hooked process");
        reap(child);
        Ok(pid)
    }
}

fn reap(mut child: Child) {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name(format!("linkfs-reap-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => debug!(pid, %status, "hooked process exited"),
            Err(err) => warn!(pid, %err, "waiting for hooked process failed"),
        });
    if let Err(err) = spawned {
        warn!(pid, %err, "cannot start reaper thread");
    }
}

/// The process environment as name/value pairs.
pub fn current_env() -> Vec<(OsString, OsString)> {
    std::env::vars_os().collect()
}

/// Locates the interception library: `LINKFS_SHIM_PATH`, then `configured`,
/// then next to the running executable (or its parent, for test binaries
/// under `deps/`).
pub fn find_shim(configured: Option<&Path>) -> LinkfsResult<PathBuf> {
    if let Some(path) = std::env::var_os(SHIM_PATH_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    let exe = std::env::current_exe()?;
    exe.ancestors()
        .skip(1)
        .take(2)
        .map(|dir| dir.join(SHIM_FILE_NAME))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            LinkfsError::Launch(format!(
                "{SHIM_FILE_NAME} not found next to {}; set {SHIM_PATH_ENV}",
                exe.display()
            ))
        })
}
