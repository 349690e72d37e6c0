// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Environment and flag overlays

use serde_json::Value as J;

use crate::ConfigError;

/// JSON overlay from `LINKFS_*` variables.
///
/// `LINKFS_SHIM_PATH` becomes `shim-path`; a double underscore nests, so
/// `LINKFS_CRASH_DUMPS__KIND` becomes `crash-dumps.kind`.
pub fn env_overlay() -> Result<J, ConfigError> {
    let built = config::Config::builder()
        .add_source(
            config::Environment::with_prefix("LINKFS")
                .prefix_separator("_")
                .separator("__")
                .convert_case(config::Case::Kebab),
        )
        .build()?;
    Ok(J::Object(
        built.try_deserialize::<serde_json::Map<String, J>>()?,
    ))
}

/// JSON overlay from `key=value` pairs. `true`/`false` become booleans.
pub fn flags_overlay<K: AsRef<str>, V: AsRef<str>>(kv_pairs: &[(K, V)]) -> J {
    let mut root = serde_json::json!({});
    for (k, v) in kv_pairs {
        let value = match v.as_ref() {
            "true" => J::Bool(true),
            "false" => J::Bool(false),
            other => J::String(other.to_string()),
        };
        crate::merge::insert_dotted(&mut root, k.as_ref(), value);
    }
    root
}

/// Splits `key=value`.
pub fn parse_flag(flag: &str) -> Result<(String, String), ConfigError> {
    match flag.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(ConfigError::InvalidFlag(flag.to_string())),
    }
}
