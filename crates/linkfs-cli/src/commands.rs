// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use linkfs::Controller;
use linkfs_config::{ConfigSources, LinkfsConfig};
use linkfs_core::{LinkFlags, SessionParameters};
use linkfs_logging::CliLoggingArgs;
use linkfs_shm::RuntimeDir;
use tracing::{info, warn};

pub const DEFAULT_INSTANCE: &str = "linkfs";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Make real files appear at virtual paths for selected processes"
)]
pub struct Cli {
    #[command(flatten)]
    pub logging: CliLoggingArgs,

    /// Configuration file layered over the user configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Configuration override, e.g. `--set log-level=debug` (repeatable)
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct InstanceArg {
    /// Session name (default: configured instance, else "linkfs")
    #[arg(long, short)]
    pub instance: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a session, apply the configured links, launch a command and
    /// wait until every hooked process has exited
    Run {
        #[command(flatten)]
        instance: InstanceArg,
        /// Working directory of the launched command
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Send this process's log output to the session log
        #[arg(long)]
        session_log: bool,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Launch a command into an existing session and print its pid
    Exec {
        #[command(flatten)]
        instance: InstanceArg,
        #[arg(long)]
        cwd: Option<PathBuf>,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Add a link to an existing session
    Link {
        #[command(flatten)]
        instance: InstanceArg,
        /// Link a directory instead of a file
        #[arg(long)]
        dir: bool,
        /// fail-if-exists, monitor-changes, create-target or recursive (repeatable)
        #[arg(long = "flag", value_name = "FLAG")]
        flags: Vec<String>,
        virtual_path: PathBuf,
        real_path: PathBuf,
    },
    /// Remove one link from an existing session
    Unlink {
        #[command(flatten)]
        instance: InstanceArg,
        virtual_path: PathBuf,
    },
    /// Remove every link from an existing session
    Clear {
        #[command(flatten)]
        instance: InstanceArg,
    },
    /// List the processes attached to a session
    Ps {
        #[command(flatten)]
        instance: InstanceArg,
    },
    /// Print the session parameters derived from the configuration
    Params {
        #[command(flatten)]
        instance: InstanceArg,
    },
}

impl Cli {
    fn load_config(&self) -> Result<LinkfsConfig> {
        let mut sources = ConfigSources::discover();
        if let Some(path) = &self.config {
            sources = sources.with_config_file(path);
        }
        let config = sources
            .with_flags(&self.overrides)?
            .load()
            .context("loading configuration")?;
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let mut controller = Controller::new(RuntimeDir::from_env());
        if let Some(shim) = &config.shim_path {
            controller = controller.with_shim_path(shim);
        }

        match self.command {
            Command::Run {
                instance,
                cwd,
                session_log,
                command,
            } => {
                let params = parameters(&config, &instance);
                run_session(&controller, &config, &params, cwd.as_deref(), session_log, &command)
                    .await
            }
            Command::Exec {
                instance,
                cwd,
                command,
            } => {
                connect(&controller, &config, &instance)?;
                let pid = controller
                    .create_process_hooked(&shell_words::join(&command), cwd.as_deref())?;
                println!("{pid}");
                Ok(())
            }
            Command::Link {
                instance,
                dir,
                flags,
                virtual_path,
                real_path,
            } => {
                let flags = parse_flags(&flags)?;
                let base = std::env::current_dir()?;
                connect(&controller, &config, &instance)?;
                let (source, destination) = (base.join(virtual_path), base.join(real_path));
                if dir {
                    controller.virtual_link_directory_static(&source, &destination, flags)?;
                } else {
                    controller.virtual_link_file(&source, &destination, flags)?;
                }
                Ok(())
            }
            Command::Unlink {
                instance,
                virtual_path,
            } => {
                connect(&controller, &config, &instance)?;
                let source = std::env::current_dir()?.join(virtual_path);
                if !controller.remove_virtual_link(&source)? {
                    bail!("no link at {}", source.display());
                }
                Ok(())
            }
            Command::Clear { instance } => {
                connect(&controller, &config, &instance)?;
                controller.clear_virtual_mappings()?;
                Ok(())
            }
            Command::Ps { instance } => {
                connect(&controller, &config, &instance)?;
                let own = std::process::id();
                let list = controller.vfs_process_list()?;
                for pid in list.pids.iter().filter(|pid| **pid != own) {
                    println!("{pid}");
                }
                if list.truncated {
                    eprintln!("(list truncated)");
                }
                Ok(())
            }
            Command::Params { instance } => {
                let params = parameters(&config, &instance);
                println!("{}", serde_json::to_string_pretty(&params)?);
                Ok(())
            }
        }
    }
}

fn parameters(config: &LinkfsConfig, instance: &InstanceArg) -> SessionParameters {
    let mut params = config.parameters(DEFAULT_INSTANCE);
    if let Some(name) = &instance.instance {
        params = SessionParameters::new(
            name,
            params.debug_mode,
            params.log_level,
            params.crash_dumps_type,
            params.crash_dumps_path,
        );
    }
    if params.name_truncated {
        warn!(instance = %params.instance_name, "instance name truncated");
    }
    params
}

fn connect(controller: &Controller, config: &LinkfsConfig, instance: &InstanceArg) -> Result<()> {
    let params = parameters(config, instance);
    controller
        .connect_vfs(&params)
        .with_context(|| format!("joining session '{}'", params.instance_name))
}

pub fn parse_flags(names: &[String]) -> Result<LinkFlags> {
    let mut flags = LinkFlags::empty();
    for name in names {
        match LinkFlags::parse_name(name) {
            Some(flag) => flags |= flag,
            None => bail!("unknown link flag '{name}'"),
        }
    }
    Ok(flags)
}

async fn run_session(
    controller: &Controller,
    config: &LinkfsConfig,
    params: &SessionParameters,
    cwd: Option<&Path>,
    session_log: bool,
    command: &[String],
) -> Result<()> {
    controller.init_logging(!session_log)?;
    controller
        .create_vfs(params)
        .with_context(|| format!("creating session '{}'", params.instance_name))?;

    for name in &config.blacklist {
        controller.blacklist_executable(name)?;
    }
    for entry in config.force_loads().entries() {
        controller.force_load_library(&entry.process_name, &entry.library_path)?;
    }
    let base = match cwd {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    controller
        .apply_mapping(&config.mapping()?, &base)
        .context("applying configured links")?;

    let pid = controller.create_process_hooked(&shell_words::join(command), cwd)?;
    info!(pid, instance = %params.instance_name, "waiting for hooked processes");
    wait_for_drain(controller).await?;
    controller.disconnect_vfs();
    Ok(())
}

/// Returns once this process is the only one attached, or on Ctrl-C.
async fn wait_for_drain(controller: &Controller) -> Result<()> {
    let own = std::process::id();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            result = &mut interrupt => {
                result?;
                info!("interrupted, leaving session");
                return Ok(());
            }
            _ = ticker.tick() => {
                let list = controller.vfs_process_list()?;
                if list.pids.iter().all(|pid| *pid == own) {
                    info!("all hooked processes exited");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[linkfs_test_utils::logged_test]
    fn run_takes_trailing_command() {
        let cli = Cli::try_parse_from([
            "linkfs", "--set", "debug=true", "run", "-i", "modtest", "--", "game", "--windowed",
        ])
        .unwrap();
        assert_eq!(cli.overrides, vec!["debug=true"]);
        match cli.command {
            Command::Run {
                instance, command, ..
            } => {
                assert_eq!(instance.instance.as_deref(), Some("modtest"));
                assert_eq!(command, vec!["game", "--windowed"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[linkfs_test_utils::logged_test]
    fn link_collects_flags() {
        let cli = Cli::try_parse_from([
            "linkfs",
            "link",
            "--dir",
            "--flag",
            "recursive",
            "--flag",
            "create-target",
            "/virtual/data",
            "/mods/data",
        ])
        .unwrap();
        let Command::Link {
            dir, flags, virtual_path, ..
        } = cli.command
        else {
            panic!("expected link");
        };
        assert!(dir);
        assert_eq!(virtual_path, PathBuf::from("/virtual/data"));
        let flags = parse_flags(&flags).unwrap();
        assert!(flags.contains(LinkFlags::RECURSIVE | LinkFlags::CREATE_TARGET));
    }

    #[linkfs_test_utils::logged_test]
    fn unknown_flag_is_rejected() {
        assert!(parse_flags(&["sideways".to_string()]).is_err());
    }

    #[linkfs_test_utils::logged_test]
    fn instance_argument_overrides_config() {
        let config = LinkfsConfig {
            instance: Some("configured".to_string()),
            ..LinkfsConfig::default()
        };
        let params = parameters(&config, &InstanceArg::default());
        assert_eq!(params.instance_name, "configured");

        let params = parameters(
            &config,
            &InstanceArg {
                instance: Some("explicit".to_string()),
            },
        );
        assert_eq!(params.instance_name, "explicit");
        assert_eq!(params.shm_name, SessionParameters::named("explicit").shm_name);
    }

    #[linkfs_test_utils::logged_test]
    fn run_requires_a_command() {
        assert!(Cli::try_parse_from(["linkfs", "run"]).is_err());
    }
}
