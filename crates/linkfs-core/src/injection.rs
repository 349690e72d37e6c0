// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Executable blacklist and forced library loads

use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Variable the dynamic loader reads the injection list from.
pub const PRELOAD_ENV: &str = "LD_PRELOAD";
/// Root directory holding every channel.
pub const RUNTIME_DIR_ENV: &str = "LINKFS_RUNTIME_DIR";
/// Region name of the session a hooked process belongs to.
pub const SHM_ENV: &str = "LINKFS_SHM";
pub const INSTANCE_ENV: &str = "LINKFS_INSTANCE";
/// Path of the interception library itself.
pub const SHIM_ENV: &str = "LINKFS_SHIM";
/// `0` silences the interception layer's own log.
pub const LOG_ENV: &str = "LINKFS_LOG";

const CONTRACT_VARS: [&str; 5] = [RUNTIME_DIR_ENV, SHM_ENV, INSTANCE_ENV, SHIM_ENV, LOG_ENV];

/// Case-insensitive suffix match of `name` against the executable path.
///
/// A bare name therefore matches the basename, and a name with directories
/// matches the tail of the path.
fn name_matches(exe: &Path, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let exe = exe.to_string_lossy().to_ascii_lowercase();
    exe.ends_with(&name.to_ascii_lowercase())
}

/// Executables that must run without interception.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutableBlacklist {
    names: Vec<String>,
}

impl ExecutableBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name`; blank and duplicate names are ignored.
    pub fn add(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() || self.names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return;
        }
        self.names.push(name.to_string());
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The entry that blacklists `exe`, if any.
    pub fn matching(&self, exe: &Path) -> Option<&str> {
        self.names
            .iter()
            .find(|name| name_matches(exe, name))
            .map(String::as_str)
    }

    pub fn is_blacklisted(&self, exe: &Path) -> bool {
        self.matching(exe).is_some()
    }
}

impl<S: AsRef<str>> FromIterator<S> for ExecutableBlacklist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Self::new();
        for name in iter {
            list.add(name.as_ref());
        }
        list
    }
}

/// One forced library load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceLoad {
    pub process_name: String,
    pub library_path: PathBuf,
}

/// Extra libraries injected into matching processes next to the shim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForceLoadTable {
    entries: Vec<ForceLoad>,
}

impl ForceLoadTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, process_name: &str, library_path: impl Into<PathBuf>) {
        let entry = ForceLoad {
            process_name: process_name.trim().to_string(),
            library_path: library_path.into(),
        };
        if entry.process_name.is_empty() || self.entries.contains(&entry) {
            return;
        }
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ForceLoad] {
        &self.entries
    }

    /// Libraries to load into `exe`, in registration order.
    pub fn libraries_for(&self, exe: &Path) -> Vec<&Path> {
        self.entries
            .iter()
            .filter(|entry| name_matches(exe, &entry.process_name))
            .map(|entry| entry.library_path.as_path())
            .collect()
    }
}

impl FromIterator<ForceLoad> for ForceLoadTable {
    fn from_iter<I: IntoIterator<Item = ForceLoad>>(iter: I) -> Self {
        let mut table = Self::new();
        for entry in iter {
            table.add(&entry.process_name, entry.library_path);
        }
        table
    }
}

/// Environment handed to hooked processes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectionEnv {
    pub runtime_dir: PathBuf,
    pub shm_name: String,
    pub instance_name: String,
    pub shim_path: PathBuf,
    pub log: bool,
}

impl InjectionEnv {
    /// Reads the contract back; `None` when a required variable is missing.
    pub fn from_vars<F>(get: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let non_empty = |name: &str| get(name).filter(|v| !v.is_empty());
        Some(Self {
            runtime_dir: non_empty(RUNTIME_DIR_ENV)?.into(),
            shm_name: non_empty(SHM_ENV)?.into_string().ok()?,
            instance_name: non_empty(INSTANCE_ENV)
                .and_then(|v| v.into_string().ok())
                .unwrap_or_default(),
            shim_path: non_empty(SHIM_ENV)?.into(),
            log: get(LOG_ENV).map_or(true, |v| v != "0"),
        })
    }

    pub fn vars(&self) -> Vec<(&'static str, OsString)> {
        vec![
            (RUNTIME_DIR_ENV, self.runtime_dir.clone().into_os_string()),
            (SHM_ENV, self.shm_name.clone().into()),
            (INSTANCE_ENV, self.instance_name.clone().into()),
            (SHIM_ENV, self.shim_path.clone().into_os_string()),
            (LOG_ENV, if self.log { "1" } else { "0" }.into()),
        ]
    }

    /// Installs the contract and puts the shim, then `extra`, at the front
    /// of the preload list. Other preloaded libraries stay behind them.
    pub fn apply(&self, env: &mut Vec<(OsString, OsString)>, extra: &[&Path]) {
        for (name, value) in self.vars() {
            set_var(env, name, value);
        }
        let mut preload: Vec<PathBuf> = Vec::with_capacity(extra.len() + 1);
        preload.push(self.shim_path.clone());
        preload.extend(extra.iter().map(|p| p.to_path_buf()));
        for existing in preload_entries(get_var(env, PRELOAD_ENV)) {
            if !preload.contains(&existing) {
                preload.push(existing);
            }
        }
        set_var(env, PRELOAD_ENV, join_preload(&preload));
    }

    /// Removes every trace of the injection: the contract variables and the
    /// shim in the preload list.
    pub fn strip(env: &mut Vec<(OsString, OsString)>, shim: Option<&Path>) {
        env.retain(|(name, _)| !CONTRACT_VARS.iter().any(|v| name == v));
        let Some(shim) = shim else {
            return;
        };
        let remaining: Vec<PathBuf> = preload_entries(get_var(env, PRELOAD_ENV))
            .into_iter()
            .filter(|p| p != shim)
            .collect();
        if remaining.is_empty() {
            env.retain(|(name, _)| name != PRELOAD_ENV);
        } else {
            set_var(env, PRELOAD_ENV, join_preload(&remaining));
        }
    }
}

fn get_var<'a>(env: &'a [(OsString, OsString)], name: &str) -> Option<&'a OsStr> {
    env.iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_os_str())
}

fn set_var(env: &mut Vec<(OsString, OsString)>, name: &str, value: OsString) {
    match env.iter_mut().find(|(k, _)| k == name) {
        Some((_, v)) => *v = value,
        None => env.push((name.into(), value)),
    }
}

/// Entries of a preload list; the loader accepts colons and spaces.
fn preload_entries(value: Option<&OsStr>) -> Vec<PathBuf> {
    let Some(value) = value else {
        return Vec::new();
    };
    value
        .to_string_lossy()
        .split([':', ' '])
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn join_preload(entries: &[PathBuf]) -> OsString {
    let mut out = OsString::new();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push(":");
        }
        out.push(entry.as_os_str());
    }
    out
}
