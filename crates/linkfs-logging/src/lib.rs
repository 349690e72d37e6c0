// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging setup shared by the linkfs binaries and libraries
//!
//! One global subscriber per process, built on `tracing-subscriber`. The
//! level filter can be reloaded after start-up (a session's log level is only
//! known once it is created or joined) and the output can be moved between
//! the local writer and the session's shared log.

pub mod crash;
pub mod sink;

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use linkfs_core::LogLevel;
use tracing::Dispatch;
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

pub use clap;
pub use sink::{SessionSink, SinkMode};
pub use tracing::Level;

const APP_DIR: &str = "linkfs";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plaintext,
    Json,
}

/// Log level accepted on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliLogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

/// Logging flags for `#[command(flatten)]`.
///
/// Logs go to stderr unless `--log-file` or `--log-dir` is given.
#[derive(Clone, Debug, Default, clap::Args)]
pub struct CliLoggingArgs {
    /// Log verbosity (default: info)
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<CliLogLevel>,

    /// Log output format (default: plaintext)
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormat>,

    /// Directory for log files
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Log file; relative names go under --log-dir or the standard log directory
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

impl CliLoggingArgs {
    /// Installs the global subscriber for `component`.
    pub fn init(self, component: &str) -> anyhow::Result<&'static LoggingHandle> {
        let level = self.log_level.unwrap_or_default().into();
        let format = self.log_format.unwrap_or_default();
        match self.log_path(component) {
            Some(path) => init_to_file(component, level, format, &path),
            None => init(component, level, format),
        }
    }

    fn log_path(&self, component: &str) -> Option<PathBuf> {
        match (&self.log_dir, &self.log_file) {
            (_, Some(file)) if file.is_absolute() => Some(file.clone()),
            (Some(dir), Some(file)) => Some(dir.join(file)),
            (None, Some(file)) => Some(standard_log_dir().join(file)),
            (Some(dir), None) => Some(dir.join(format!("{component}.log"))),
            (None, None) => None,
        }
    }
}

/// Where linkfs keeps its logs when no directory is configured:
/// `~/Library/Logs/linkfs` on macOS, the XDG data dir elsewhere.
pub fn standard_log_dir() -> PathBuf {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|home| home.join("Library").join("Logs"))
    } else {
        dirs::data_dir()
    };
    base.unwrap_or_else(std::env::temp_dir).join(APP_DIR)
}

/// Handle to the installed subscriber.
pub struct LoggingHandle {
    component: String,
    filter: reload::Handle<EnvFilter, Registry>,
    sink: SessionSink,
    env_override: bool,
}

static HANDLE: OnceLock<LoggingHandle> = OnceLock::new();

/// The handle of the subscriber installed by this crate, if any.
pub fn handle() -> Option<&'static LoggingHandle> {
    HANDLE.get()
}

fn default_directive(component: &str, level: impl std::fmt::Display) -> String {
    format!("{level},{}={level}", component.replace('-', "_"))
}

impl LoggingHandle {
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn sink(&self) -> &SessionSink {
        &self.sink
    }

    /// Applies a session log level. `RUST_LOG`, when set, keeps precedence.
    pub fn set_level(&self, level: LogLevel) -> anyhow::Result<()> {
        if self.env_override {
            return Ok(());
        }
        let directive = default_directive(&self.component, level.as_filter_directive());
        self.filter.reload(EnvFilter::new(directive))?;
        Ok(())
    }
}

pub fn init(
    component: &str,
    default_level: Level,
    format: LogFormat,
) -> anyhow::Result<&'static LoggingHandle> {
    init_with_writer(component, default_level, format, io::stderr)
}

pub fn init_to_file(
    component: &str,
    default_level: Level,
    format: LogFormat,
    log_path: &Path,
) -> anyhow::Result<&'static LoggingHandle> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = std::fs::OpenOptions::new().create(true).append(true).open(log_path)?;
    init_with_writer(component, default_level, format, std::sync::Arc::new(log_file))
}

/// Installs the global subscriber writing through `writer`.
///
/// Fails if a global subscriber is already set.
pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> anyhow::Result<&'static LoggingHandle>
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env().ok();
    let env_override = env_filter.is_some();
    let filter = env_filter
        .unwrap_or_else(|| EnvFilter::new(default_directive(component, default_level)));
    let (filter, filter_handle) = reload::Layer::new(filter);
    let sink = SessionSink::new(writer);

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer().with_writer(sink.clone()).json();
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer().with_writer(sink.clone());
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
    }

    let handle = LoggingHandle {
        component: component.to_string(),
        filter: filter_handle,
        sink,
        env_override,
    };
    Ok(HANDLE.get_or_init(|| handle))
}

/// A non-global dispatcher appending plain text to `log_path`.
///
/// Used inside processes we do not own, where installing a global
/// subscriber would clash with the host's own logging.
pub fn file_dispatch(component: &str, level: LogLevel, log_path: &Path) -> io::Result<Dispatch> {
    let file = std::fs::OpenOptions::new().create(true).append(true).open(log_path)?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(default_directive(
            component,
            level.as_filter_directive(),
        )))
        .with_writer(std::sync::Arc::new(file))
        .with_ansi(false)
        .with_target(false)
        .finish();
    Ok(Dispatch::new(subscriber))
}
