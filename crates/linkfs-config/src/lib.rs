// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Layered configuration for linkfs.
//!
//! Layers are merged as JSON in the order user file < environment <
//! `--config` file < `--set key=value` flags, then extracted into
//! [`LinkfsConfig`]. Keys are kebab-case, e.g.
//!
//! ```toml
//! instance = "modtest"
//! log-level = "info"
//!
//! [crash-dumps]
//! kind = "mini"
//!
//! [[links]]
//! virtual = "/games/foo/data"
//! real = "/mods/overwrite"
//! kind = "directory"
//! flags = ["recursive", "create-target"]
//! ```

pub mod env;
pub mod loader;
pub mod merge;
pub mod paths;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as J;
use std::path::PathBuf;

use linkfs_core::{
    CrashDumpsType, ExecutableBlacklist, ForceLoadTable, LinkFlags, LinkKind, LogLevel, Mapping,
    MappingEntry, SessionParameters,
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("environment overlay: {0}")]
    Env(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Extract(String),
    #[error("invalid flag '{0}', expected key=value")]
    InvalidFlag(String),
    #[error("unknown flag '{flag}' on link {link}")]
    UnknownFlag { link: String, flag: String },
}

/// Resolved configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LinkfsConfig {
    pub instance: Option<String>,
    #[serde(deserialize_with = "flexible_bool")]
    pub debug: bool,
    pub log_level: LogLevel,
    pub crash_dumps: CrashDumpsConfig,
    pub shim_path: Option<PathBuf>,
    pub links: Vec<LinkConfig>,
    pub blacklist: Vec<String>,
    pub force_load: Vec<ForceLoadConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrashDumpsConfig {
    pub kind: CrashDumpsType,
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LinkConfig {
    #[serde(rename = "virtual")]
    pub virtual_path: PathBuf,
    #[serde(rename = "real")]
    pub real_path: PathBuf,
    pub kind: LinkKind,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ForceLoadConfig {
    pub process: String,
    pub library: PathBuf,
}

// Environment values arrive as strings.
fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => Ok(b),
        Raw::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            other => Err(D::Error::custom(format!("invalid boolean '{other}'"))),
        },
    }
}

impl LinkfsConfig {
    /// Session parameters; `default_instance` is used when no instance is configured.
    pub fn parameters(&self, default_instance: &str) -> SessionParameters {
        SessionParameters::new(
            self.instance.as_deref().unwrap_or(default_instance),
            self.debug,
            self.log_level,
            self.crash_dumps.kind,
            self.crash_dumps.path.clone().unwrap_or_else(paths::default_dump_dir),
        )
    }

    pub fn mapping(&self) -> Result<Mapping, ConfigError> {
        self.links
            .iter()
            .map(|link| {
                let mut flags = LinkFlags::empty();
                for name in &link.flags {
                    let flag = LinkFlags::parse_name(name).ok_or_else(|| {
                        ConfigError::UnknownFlag {
                            link: link.virtual_path.display().to_string(),
                            flag: name.clone(),
                        }
                    })?;
                    flags |= flag;
                }
                Ok(MappingEntry {
                    source: link.virtual_path.clone(),
                    destination: link.real_path.clone(),
                    kind: link.kind,
                    flags,
                })
            })
            .collect()
    }

    pub fn blacklist(&self) -> ExecutableBlacklist {
        self.blacklist.iter().collect()
    }

    pub fn force_loads(&self) -> ForceLoadTable {
        let mut table = ForceLoadTable::new();
        for entry in &self.force_load {
            table.add(&entry.process, entry.library.clone());
        }
        table
    }
}

/// Where configuration layers come from.
#[derive(Clone, Debug, Default)]
pub struct ConfigSources {
    /// Skipped when the file does not exist.
    pub user: Option<PathBuf>,
    /// Must exist when given.
    pub cli_config: Option<PathBuf>,
    pub flags: Vec<(String, String)>,
    pub use_env: bool,
}

impl ConfigSources {
    /// User file at its standard location plus the environment.
    pub fn discover() -> Self {
        Self {
            user: Some(paths::user_config_path()),
            use_env: true,
            ..Self::default()
        }
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cli_config = Some(path.into());
        self
    }

    /// Adds `key=value` overrides.
    pub fn with_flags<S: AsRef<str>>(mut self, flags: &[S]) -> Result<Self, ConfigError> {
        for flag in flags {
            self.flags.push(env::parse_flag(flag.as_ref())?);
        }
        Ok(self)
    }

    /// Merged JSON of every layer.
    pub fn load_json(&self) -> Result<J, ConfigError> {
        let mut json = serde_json::json!({});

        if let Some(user) = self.user.as_deref().filter(|p| p.exists()) {
            merge::merge_two_json(&mut json, loader::read_layer(user)?);
        }
        if self.use_env {
            merge::merge_two_json(&mut json, env::env_overlay()?);
        }
        if let Some(cli_config) = &self.cli_config {
            merge::merge_two_json(&mut json, loader::read_layer(cli_config)?);
        }
        merge::merge_two_json(&mut json, env::flags_overlay(&self.flags));

        Ok(json)
    }

    pub fn load(&self) -> Result<LinkfsConfig, ConfigError> {
        from_json(self.load_json()?)
    }
}

/// Extracts the typed configuration; errors name the offending key path.
pub fn from_json(json: J) -> Result<LinkfsConfig, ConfigError> {
    serde_path_to_error::deserialize(json).map_err(|e| ConfigError::Extract(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkfs_test_utils::TestTree;
    use std::path::Path;

    const SAMPLE: &str = r#"
        instance = "modtest"
        log-level = "info"
        blacklist = ["helper", "Updater.exe"]

        [crash-dumps]
        kind = "mini"
        path = "/var/dumps"

        [[links]]
        virtual = "/games/foo/data"
        real = "/mods/overwrite"
        kind = "directory"
        flags = ["recursive", "create-target"]

        [[links]]
        virtual = "/games/foo/plugin.esp"
        real = "/mods/p.esp"
        kind = "file"

        [[force-load]]
        process = "game"
        library = "/opt/extra.so"
    "#;

    fn sources(tree: &TestTree) -> ConfigSources {
        ConfigSources {
            user: Some(tree.path("user.toml")),
            ..ConfigSources::default()
        }
    }

    #[test]
    fn full_file_extracts() {
        let tree = TestTree::new().unwrap().file("user.toml", SAMPLE).unwrap();
        let cfg = sources(&tree).load().unwrap();

        assert_eq!(cfg.instance.as_deref(), Some("modtest"));
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert_eq!(cfg.crash_dumps.kind, CrashDumpsType::Mini);

        let params = cfg.parameters("fallback");
        assert_eq!(params.instance_name, "modtest");
        assert_eq!(params.crash_dumps_path, PathBuf::from("/var/dumps"));

        let mapping = cfg.mapping().unwrap();
        assert_eq!(mapping.entries().len(), 2);
        assert_eq!(mapping.entries()[0].kind, LinkKind::Directory);
        assert!(mapping.entries()[0].flags.contains(LinkFlags::RECURSIVE));
        assert!(mapping.entries()[0].flags.contains(LinkFlags::CREATE_TARGET));
        assert!(mapping.entries()[1].flags.is_empty());

        assert!(cfg.blacklist().is_blacklisted(Path::new("/opt/updater.exe")));
        assert_eq!(
            cfg.force_loads().libraries_for(Path::new("/bin/game")),
            vec![Path::new("/opt/extra.so")]
        );
    }

    #[test]
    fn later_layers_win() {
        let tree = TestTree::new()
            .unwrap()
            .file("user.toml", SAMPLE)
            .unwrap()
            .file("cli.toml", "instance = \"from-cli\"\ndebug = true\n")
            .unwrap();
        let cfg = sources(&tree)
            .with_config_file(tree.path("cli.toml"))
            .with_flags(&["crash-dumps.kind=full", "debug=false"])
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(cfg.instance.as_deref(), Some("from-cli"));
        assert!(!cfg.debug);
        assert_eq!(cfg.crash_dumps.kind, CrashDumpsType::Full);
        assert_eq!(cfg.crash_dumps.path, Some(PathBuf::from("/var/dumps")));
        assert_eq!(cfg.links.len(), 2);
    }

    #[test]
    fn missing_user_file_yields_defaults() {
        let tree = TestTree::new().unwrap();
        let cfg = sources(&tree).load().unwrap();
        assert_eq!(cfg, LinkfsConfig::default());
        assert_eq!(cfg.parameters("fallback").instance_name, "fallback");
    }

    #[test]
    fn missing_cli_config_is_an_error() {
        let tree = TestTree::new().unwrap();
        let err = sources(&tree)
            .with_config_file(tree.path("absent.toml"))
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn unknown_link_flag_is_reported() {
        let tree = TestTree::new()
            .unwrap()
            .file(
                "user.toml",
                "[[links]]\nvirtual = \"/a\"\nreal = \"/b\"\nkind = \"file\"\nflags = [\"sideways\"]\n",
            )
            .unwrap();
        let err = sources(&tree).load().unwrap().mapping().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFlag { ref flag, .. } if flag == "sideways"));
    }

    #[test]
    fn extraction_errors_name_the_key() {
        let err = from_json(serde_json::json!({"log-level": "loud"})).unwrap_err();
        assert!(err.to_string().contains("log-level"), "{err}");
    }

    #[test]
    fn string_booleans_are_accepted() {
        let cfg = from_json(serde_json::json!({"debug": "yes"})).unwrap();
        assert!(cfg.debug);
        assert!(from_json(serde_json::json!({"debug": "maybe"})).is_err());
    }

    #[test]
    #[serial_test::serial(linkfs_env)]
    fn environment_sits_between_user_and_cli_files() {
        let tree = TestTree::new().unwrap().file("user.toml", SAMPLE).unwrap();
        std::env::set_var("LINKFS_LOG_LEVEL", "debug");
        std::env::set_var("LINKFS_INSTANCE", "from-env");
        let cfg = ConfigSources {
            use_env: true,
            ..sources(&tree)
        }
        .load();
        std::env::remove_var("LINKFS_LOG_LEVEL");
        std::env::remove_var("LINKFS_INSTANCE");

        let cfg = cfg.unwrap();
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.instance.as_deref(), Some("from-env"));
    }
}
