// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-test log files.
//!
//! Every test writes to its own file under `target/test-logs/<date>/`. A
//! passing test prints one line; a failing test prints the log location and
//! size so the full output can be inspected afterwards.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

const MAX_TEST_NAME_LEN: usize = 200;

#[derive(Error, Debug)]
pub enum TestLogError {
    #[error("failed to create test log: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write to test log file: {path}")]
    Write { path: PathBuf },

    #[error("invalid test name: {name}")]
    InvalidTestName { name: String },
}

/// How a test ended, as recorded in its log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<'a> {
    Passed,
    Failed(&'a str),
}

/// Log file of one running test.
///
/// The verdict is written once, by [`TestLogger::finish`]. A logger dropped
/// without a verdict (the test panicked or bailed out) records a failure.
pub struct TestLogger {
    log_path: PathBuf,
    writer: BufWriter<File>,
    test_name: String,
    start_time: DateTime<Utc>,
    finished: bool,
}

impl TestLogger {
    pub fn new(test_name: &str) -> Result<Self, TestLogError> {
        validate_test_name(test_name)?;

        let log_path = create_unique_test_log(test_name)?;
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&log_path)?;

        let mut logger = Self {
            log_path,
            writer: BufWriter::new(file),
            test_name: test_name.to_string(),
            start_time: Utc::now(),
            finished: false,
        };
        logger.write_header()?;
        Ok(logger)
    }

    /// Appends a timestamped line and flushes it.
    pub fn log(&mut self, message: &str) -> Result<(), TestLogError> {
        let timestamp = Utc::now().format("%H:%M:%S%.3f");
        writeln!(self.writer, "[{timestamp}] {message}")
            .and_then(|_| self.writer.flush())
            .map_err(|_| TestLogError::Write {
                path: self.log_path.clone(),
            })
    }

    /// Logs `data` as pretty-printed JSON under `label`.
    pub fn log_json<T: serde::Serialize>(
        &mut self,
        label: &str,
        data: &T,
    ) -> Result<(), TestLogError> {
        let json = serde_json::to_string_pretty(data).map_err(|_| TestLogError::Write {
            path: self.log_path.clone(),
        })?;
        self.log(&format!("{label}: {json}"))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Writes the verdict and reports it on stdout. Later calls are no-ops.
    pub fn finish(&mut self, verdict: Verdict<'_>) -> Result<&Path, TestLogError> {
        if self.finished {
            return Ok(&self.log_path);
        }
        self.finished = true;
        let elapsed = Utc::now()
            .signed_duration_since(self.start_time)
            .num_milliseconds() as f64
            / 1000.0;

        match verdict {
            Verdict::Passed => {
                self.log(&format!("passed in {elapsed:.3}s"))?;
                println!("ok {}", self.test_name);
            }
            Verdict::Failed(reason) => {
                self.log(&format!("failed after {elapsed:.3}s: {reason}"))?;
                let size = fs::metadata(&self.log_path).map(|m| m.len()).unwrap_or(0);
                println!(
                    "FAILED {} - log: {} ({size} bytes)",
                    self.test_name,
                    self.log_path.display()
                );
            }
        }
        Ok(&self.log_path)
    }

    fn write_header(&mut self) -> Result<(), TestLogError> {
        writeln!(self.writer, "=== linkfs test log ===")?;
        writeln!(self.writer, "Test: {}", self.test_name)?;
        writeln!(
            self.writer,
            "Started: {}",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(self.writer, "Process: {}", std::process::id())?;
        if let Some(thread) = std::thread::current().name() {
            writeln!(self.writer, "Thread: {thread}")?;
        }
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for TestLogger {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let reason = if std::thread::panicking() {
            "test panicked"
        } else {
            "test returned early"
        };
        if let Err(err) = self.finish(Verdict::Failed(reason)) {
            eprintln!("cannot finish test log {}: {err}", self.log_path.display());
        }
    }
}

/// Return types a `#[logged_test]` body may have.
pub trait TestOutcome {
    /// Records `self` in `logger` and hands it back to the test harness.
    fn record(self, logger: &mut TestLogger) -> Self;
}

impl TestOutcome for () {
    fn record(self, logger: &mut TestLogger) {
        if let Err(err) = logger.finish(Verdict::Passed) {
            panic!("cannot finish test log: {err}");
        }
    }
}

impl<T, E: std::fmt::Display> TestOutcome for Result<T, E> {
    fn record(self, logger: &mut TestLogger) -> Self {
        let written = match &self {
            Ok(_) => logger.finish(Verdict::Passed).map(|_| ()),
            Err(err) => logger.finish(Verdict::Failed(&err.to_string())).map(|_| ()),
        };
        if let Err(err) = written {
            eprintln!("cannot finish test log: {err}");
        }
        self
    }
}

/// A fresh log path for `test_name`, creating its directory.
pub fn create_unique_test_log(test_name: &str) -> Result<PathBuf, TestLogError> {
    let now = Utc::now();
    let log_dir = find_workspace_root()
        .join("target")
        .join("test-logs")
        .join(now.format("%Y-%m-%d").to_string());
    fs::create_dir_all(&log_dir)?;

    let filename = format!(
        "{}-{}-{}.log",
        sanitize_filename(test_name),
        now.format("%H-%M-%S"),
        Uuid::new_v4()
    );
    Ok(log_dir.join(filename))
}

/// Nearest ancestor of the working directory with a `[workspace]` manifest.
fn find_workspace_root() -> PathBuf {
    let current_dir = env::current_dir().unwrap_or_else(|_| env::temp_dir());
    current_dir
        .ancestors()
        .find(|dir| {
            fs::read_to_string(dir.join("Cargo.toml"))
                .map(|content| content.contains("[workspace]"))
                .unwrap_or(false)
        })
        .map(Path::to_path_buf)
        .unwrap_or(current_dir)
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

fn validate_test_name(name: &str) -> Result<(), TestLogError> {
    if name.is_empty() || name.len() > MAX_TEST_NAME_LEN {
        return Err(TestLogError::InvalidTestName {
            name: name.chars().take(MAX_TEST_NAME_LEN).collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[crate::logged_test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("resolve_nested"), "resolve_nested");
        assert_eq!(sanitize_filename("a b/c:d"), "a_b_c_d");
    }

    #[crate::logged_test]
    fn test_validate_test_name() {
        assert!(validate_test_name("ok").is_ok());
        assert!(validate_test_name("").is_err());
        assert!(validate_test_name(&"x".repeat(201)).is_err());
    }

    #[crate::logged_test]
    fn test_log_paths_are_unique() {
        let first = create_unique_test_log("same").unwrap();
        let second = create_unique_test_log("same").unwrap();
        assert_ne!(first, second);
        assert!(first.parent().unwrap().is_dir());
    }

    #[test]
    fn test_failure_keeps_log_contents() {
        let mut logger = TestLogger::new("failure_contents").unwrap();
        logger.log("step one").unwrap();
        logger.log_json("state", &vec!["a", "b"]).unwrap();
        let path = logger.finish(Verdict::Failed("boom")).unwrap().to_path_buf();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("step one"));
        assert!(text.contains("\"a\""));
        assert!(text.contains("failed after"));
        assert!(text.contains("boom"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_dropped_logger_records_failure() {
        let logger = TestLogger::new("dropped_logger").unwrap();
        let path = logger.log_path().to_path_buf();
        drop(logger);
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("test returned early"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_error_outcome_is_recorded() {
        let mut logger = TestLogger::new("error_outcome").unwrap();
        let path = logger.log_path().to_path_buf();
        let outcome: Result<(), String> = Err("not linked".to_string());
        assert!(outcome.record(&mut logger).is_err());
        drop(logger);
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("not linked"));
        assert!(!text.contains("returned early"));
        fs::remove_file(path).unwrap();
    }
}
