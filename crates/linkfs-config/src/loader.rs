// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! TOML layer loading

use serde_json::Value as J;
use std::path::Path;

use crate::ConfigError;

/// Parses a TOML document into the JSON form used for merging.
pub fn parse_toml_to_json(toml_str: &str) -> Result<J, ConfigError> {
    let toml: toml::Value = toml_str.parse::<toml::Value>()?;
    serde_json::to_value(toml).map_err(|e| ConfigError::Extract(e.to_string()))
}

/// Reads one configuration file.
pub fn read_layer(path: &Path) -> Result<J, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let json = parse_toml_to_json(&content)?;
    tracing::debug!(path = %path.display(), "loaded configuration layer");
    Ok(json)
}
