// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end tests for the interception library
//!
//! The tests create a real session, preload `liblinkfs_hooks.so` into the
//! `linkfs_probe` helper and check what the probe observes.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};

use linkfs::{Controller, SessionParameters};
use linkfs_core::InjectionEnv;
use linkfs_shm::RuntimeDir;
use once_cell::sync::OnceCell;
use tempfile::TempDir;

pub const SHIM_NAME: &str = "liblinkfs_hooks.so";
pub const PROBE_NAME: &str = "linkfs_probe";

/// `target/<profile>` of the running test binary.
pub fn target_profile_dir() -> PathBuf {
    let exe = std::env::current_exe().expect("current exe");
    // target/<profile>/deps/<test-binary>
    exe.ancestors()
        .nth(2)
        .map(Path::to_path_buf)
        .expect("test binary lives under target/<profile>/deps")
}

/// Path of the built interception library, building it on first use when
/// it is missing.
pub fn find_shim_path() -> PathBuf {
    static SHIM: OnceCell<PathBuf> = OnceCell::new();
    SHIM.get_or_init(|| {
        if let Some(path) = std::env::var_os(linkfs::launch::SHIM_PATH_ENV) {
            return PathBuf::from(path);
        }
        let dir = target_profile_dir();
        let shim = dir.join(SHIM_NAME);
        if !shim.exists() {
            build_shim(&dir);
        }
        assert!(
            shim.exists(),
            "Shim library not found at {}. Build the linkfs-hooks crate first.",
            shim.display()
        );
        shim
    })
    .clone()
}

fn build_shim(profile_dir: &Path) {
    let cargo = std::env::var_os("CARGO").unwrap_or_else(|| "cargo".into());
    let workspace = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("..");
    let mut command = Command::new(cargo);
    command.current_dir(workspace).args(["build", "-p", "linkfs-hooks"]);
    if profile_dir.file_name() == Some(OsStr::new("release")) {
        command.arg("--release");
    }
    let status = command.status().expect("running cargo build for linkfs-hooks");
    assert!(status.success(), "building linkfs-hooks failed: {status}");
}

pub fn find_probe_path() -> PathBuf {
    let probe = target_profile_dir().join(PROBE_NAME);
    assert!(probe.exists(), "{PROBE_NAME} not found at {}", probe.display());
    probe
}

/// A live session in a private runtime directory.
pub struct Harness {
    pub controller: Controller,
    pub shim: PathBuf,
    pub probe: PathBuf,
    _runtime: TempDir,
}

impl Harness {
    pub fn new(instance: &str) -> Self {
        let runtime = tempfile::tempdir().expect("runtime dir");
        let shim = find_shim_path();
        let controller =
            Controller::new(RuntimeDir::at(runtime.path())).with_shim_path(shim.clone());
        controller
            .create_vfs(&SessionParameters::named(instance))
            .expect("create session");
        Self {
            controller,
            shim,
            probe: find_probe_path(),
            _runtime: runtime,
        }
    }

    pub fn injection(&self) -> InjectionEnv {
        let params = self.controller.current_params().expect("session is live");
        InjectionEnv {
            runtime_dir: self.controller.runtime().root().to_path_buf(),
            shm_name: params.shm_name,
            instance_name: params.instance_name,
            shim_path: self.shim.clone(),
            log: true,
        }
    }

    /// The probe with the injection contract applied, output captured.
    pub fn probe_command<S: AsRef<OsStr>>(&self, args: &[S]) -> Command {
        let mut env: Vec<(OsString, OsString)> = std::env::vars_os().collect();
        self.injection().apply(&mut env, &[]);
        let mut command = Command::new(&self.probe);
        command
            .args(args)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    pub fn run_probe<S: AsRef<OsStr>>(&self, args: &[S]) -> Output {
        self.probe_command(args).output().expect("run probe")
    }

    /// Stdout lines of a successful probe run.
    pub fn probe_lines<S: AsRef<OsStr>>(&self, args: &[S]) -> Vec<String> {
        let output = self.run_probe(args);
        assert!(
            output.status.success(),
            "probe failed: {}\n{}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn spawn_probe<S: AsRef<OsStr>>(&self, args: &[S]) -> Child {
        self.probe_command(args).spawn().expect("spawn probe")
    }

    pub fn is_attached(&self, pid: u32) -> bool {
        self.controller
            .vfs_process_list()
            .map(|list| list.contains(pid))
            .unwrap_or(false)
    }
}
