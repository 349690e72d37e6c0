// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Session parameters and the enumerations they carry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{LinkfsError, LinkfsResult};

/// Longest instance name kept after construction, in characters.
pub const MAX_INSTANCE_NAME_LEN: usize = 63;

/// Format version of the shared region. Part of every derived region name.
pub const REGION_VERSION: u32 = 1;

/// Verbosity of the engine's own diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    #[default]
    Error,
}

impl LogLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warning => 2,
            LogLevel::Error => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(LogLevel::Debug),
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Warning),
            3 => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!(
                "Invalid log level: {}. Use 'debug', 'info', 'warning' or 'error'",
                s
            )),
        }
    }
}

/// What a crash dump contains.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrashDumpsType {
    #[default]
    None,
    Mini,
    Data,
    Full,
}

impl CrashDumpsType {
    pub fn as_u8(self) -> u8 {
        match self {
            CrashDumpsType::None => 0,
            CrashDumpsType::Mini => 1,
            CrashDumpsType::Data => 2,
            CrashDumpsType::Full => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CrashDumpsType::None),
            1 => Some(CrashDumpsType::Mini),
            2 => Some(CrashDumpsType::Data),
            3 => Some(CrashDumpsType::Full),
            _ => None,
        }
    }
}

impl fmt::Display for CrashDumpsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrashDumpsType::None => "none",
            CrashDumpsType::Mini => "mini",
            CrashDumpsType::Data => "data",
            CrashDumpsType::Full => "full",
        };
        f.write_str(name)
    }
}

impl FromStr for CrashDumpsType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CrashDumpsType::None),
            "mini" => Ok(CrashDumpsType::Mini),
            "data" => Ok(CrashDumpsType::Data),
            "full" => Ok(CrashDumpsType::Full),
            _ => Err(format!(
                "Invalid crash dump type: {}. Use 'none', 'mini', 'data' or 'full'",
                s
            )),
        }
    }
}

/// Configuration of one VFS session.
///
/// Built once through [`SessionParameters::new`]; the region names are derived
/// from the (possibly truncated) instance name and never set by hand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParameters {
    pub instance_name: String,
    pub shm_name: String,
    pub inverse_shm_name: String,
    pub debug_mode: bool,
    pub log_level: LogLevel,
    pub crash_dumps_type: CrashDumpsType,
    pub crash_dumps_path: PathBuf,
    /// True when the requested instance name was cut to [`MAX_INSTANCE_NAME_LEN`].
    #[serde(default)]
    pub name_truncated: bool,
}

impl SessionParameters {
    pub fn new(
        instance_name: &str,
        debug_mode: bool,
        log_level: LogLevel,
        crash_dumps_type: CrashDumpsType,
        crash_dumps_path: impl Into<PathBuf>,
    ) -> Self {
        let (name, name_truncated) = truncate_chars(instance_name, MAX_INSTANCE_NAME_LEN);
        Self {
            shm_name: shm_name_for(&name),
            inverse_shm_name: inverse_shm_name_for(&name),
            instance_name: name,
            debug_mode,
            log_level,
            crash_dumps_type,
            crash_dumps_path: crash_dumps_path.into(),
            name_truncated,
        }
    }

    /// Parameters with default diagnostics for the given name.
    pub fn named(instance_name: &str) -> Self {
        Self::new(
            instance_name,
            false,
            LogLevel::default(),
            CrashDumpsType::default(),
            PathBuf::new(),
        )
    }

    /// Checks the invariants a session relies on.
    pub fn validate(&self) -> LinkfsResult<()> {
        if self.instance_name.trim().is_empty() {
            return Err(LinkfsError::InvalidInstanceName(
                "instance name must not be empty".to_string(),
            ));
        }
        if self.instance_name.contains('\0') {
            return Err(LinkfsError::InvalidInstanceName(
                "instance name must not contain NUL".to_string(),
            ));
        }
        if self.shm_name != shm_name_for(&self.instance_name)
            || self.inverse_shm_name != inverse_shm_name_for(&self.instance_name)
        {
            return Err(LinkfsError::InvalidInstanceName(format!(
                "region names do not belong to instance '{}'",
                self.instance_name
            )));
        }
        Ok(())
    }
}

/// Region name for an instance name.
pub fn shm_name_for(instance_name: &str) -> String {
    format!("{}_v{}", encode_name(instance_name), REGION_VERSION)
}

/// Inverse region name for an instance name.
pub fn inverse_shm_name_for(instance_name: &str) -> String {
    format!("{}_inverse_v{}", encode_name(instance_name), REGION_VERSION)
}

/// Escapes the characters a file name cannot carry as `%XX`. `%` itself is
/// escaped too, so distinct instance names never share a region name.
fn encode_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' | '/' | '\\' | '\0' => encoded.push_str(&format!("%{:02X}", c as u32)),
            _ => encoded.push(c),
        }
    }
    encoded
}

/// Cuts `s` to at most `max` characters, never splitting a character.
pub fn truncate_chars(s: &str, max: usize) -> (String, bool) {
    match s.char_indices().nth(max) {
        Some((idx, _)) => (s[..idx].to_string(), true),
        None => (s.to_string(), false),
    }
}
