// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration file locations

use std::path::PathBuf;

/// Overrides the directory holding the user configuration.
pub const HOME_ENV: &str = "LINKFS_HOME";

/// `$LINKFS_HOME/config.toml`, else the platform config directory.
pub fn user_config_path() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join("config.toml");
    }

    if cfg!(target_os = "macos") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("Library")
            .join("Application Support")
            .join("linkfs")
            .join("config.toml")
    } else {
        std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("linkfs")
            .join("config.toml")
    }
}

/// Default directory for crash dumps.
pub fn default_dump_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("linkfs")
        .join("dumps")
}
