// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Panic-time crash dumps.
//!
//! A dump is a small text file `<dir>/<component>-<pid>-<unix-ts>.dmp`. How
//! much goes into it depends on [`CrashDumpsType`].

use std::backtrace::Backtrace;
use std::fmt::Write as _;
use std::fs;
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use linkfs_core::CrashDumpsType;

#[derive(Clone, Debug)]
pub struct CrashDumpSettings {
    pub kind: CrashDumpsType,
    pub dir: PathBuf,
    pub component: String,
    /// Session description written into `Data` and `Full` dumps.
    pub summary: Option<String>,
}

static SETTINGS: OnceLock<Arc<Mutex<Option<CrashDumpSettings>>>> = OnceLock::new();

fn settings_slot() -> &'static Arc<Mutex<Option<CrashDumpSettings>>> {
    SETTINGS.get_or_init(|| {
        let slot: Arc<Mutex<Option<CrashDumpSettings>>> = Arc::new(Mutex::new(None));
        let hook_slot = Arc::clone(&slot);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let settings = hook_slot.lock().ok().and_then(|s| s.clone());
            if let Some(settings) = settings {
                let _ = write_dump(&settings, info);
            }
            previous(info);
        }));
        slot
    })
}

/// Installs (or reconfigures) the dump hook; `None` disables dumping.
///
/// The process-wide panic hook is chained once; later calls only swap the
/// settings it reads.
pub fn install(settings: CrashDumpSettings) {
    let enabled = settings.kind != CrashDumpsType::None;
    if let Ok(mut slot) = settings_slot().lock() {
        *slot = enabled.then_some(settings);
    }
}

pub fn disable() {
    if let Some(slot) = SETTINGS.get() {
        if let Ok(mut slot) = slot.lock() {
            *slot = None;
        }
    }
}

pub fn dump_path(dir: &Path, component: &str, pid: u32, timestamp: u64) -> PathBuf {
    dir.join(format!("{component}-{pid}-{timestamp}.dmp"))
}

/// Renders the dump body for `message` raised at `location`.
pub fn render(settings: &CrashDumpSettings, message: &str, location: Option<String>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "component: {}", settings.component);
    let _ = writeln!(out, "pid: {}", std::process::id());
    let _ = writeln!(out, "kind: {}", settings.kind);
    let _ = writeln!(out, "panic: {message}");
    if let Some(location) = location {
        let _ = writeln!(out, "location: {location}");
    }
    if matches!(settings.kind, CrashDumpsType::Data | CrashDumpsType::Full) {
        if let Some(summary) = &settings.summary {
            let _ = writeln!(out, "\nsession:\n{summary}");
        }
    }
    if settings.kind == CrashDumpsType::Full {
        let _ = writeln!(out, "\nbacktrace:\n{}", Backtrace::force_capture());
    }
    out
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn write_dump(settings: &CrashDumpSettings, info: &PanicHookInfo<'_>) -> std::io::Result<PathBuf> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let body = render(
        settings,
        &panic_message(info),
        info.location().map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
    );
    fs::create_dir_all(&settings.dir)?;
    let path = dump_path(&settings.dir, &settings.component, std::process::id(), timestamp);
    fs::write(&path, body)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(kind: CrashDumpsType, dir: &Path) -> CrashDumpSettings {
        CrashDumpSettings {
            kind,
            dir: dir.to_path_buf(),
            component: "linkfs-test".to_string(),
            summary: Some("instance: demo".to_string()),
        }
    }

    #[test]
    fn mini_dump_has_no_session_data() {
        let body = render(
            &settings(CrashDumpsType::Mini, Path::new("/tmp")),
            "boom",
            Some("src/lib.rs:1:1".to_string()),
        );
        assert!(body.contains("panic: boom"));
        assert!(body.contains("location: src/lib.rs:1:1"));
        assert!(!body.contains("instance: demo"));
        assert!(!body.contains("backtrace:"));
    }

    #[test]
    fn full_dump_adds_summary_and_backtrace() {
        let body = render(&settings(CrashDumpsType::Full, Path::new("/tmp")), "boom", None);
        assert!(body.contains("instance: demo"));
        assert!(body.contains("backtrace:"));
    }

    #[test]
    fn panic_writes_dump_file() {
        let dir = tempfile::tempdir().unwrap();
        install(settings(CrashDumpsType::Data, dir.path()));
        let result = std::thread::spawn(|| panic!("crash dump probe")).join();
        disable();
        assert!(result.is_err());

        let dumps: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(dumps.len(), 1);
        let body = fs::read_to_string(&dumps[0]).unwrap();
        assert!(body.contains("crash dump probe"));
        assert!(body.contains("instance: demo"));
        assert!(dumps[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(&format!("linkfs-test-{}-", std::process::id())));
    }
}
