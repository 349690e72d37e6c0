// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Flat boolean interface over a process-wide [`Controller`].
//!
//! Callers that cannot carry typed errors use these functions; failures are
//! logged and reported as `false`.

use std::path::Path;

use linkfs_core::{CrashDumpsType, LinkFlags, LinkfsResult, LogLevel, SessionParameters};
use once_cell::sync::Lazy;
use tracing::error;

use crate::controller::Controller;

pub const LINKFLAG_FAILIFEXISTS: u32 = LinkFlags::FAIL_IF_EXISTS.bits();
pub const LINKFLAG_MONITORCHANGES: u32 = LinkFlags::MONITOR_CHANGES.bits();
pub const LINKFLAG_CREATETARGET: u32 = LinkFlags::CREATE_TARGET.bits();
pub const LINKFLAG_RECURSIVE: u32 = LinkFlags::RECURSIVE.bits();

static CONTROLLER: Lazy<Controller> = Lazy::new(Controller::default);

/// The controller behind this module.
pub fn controller() -> &'static Controller {
    &CONTROLLER
}

fn report<T>(operation: &str, result: LinkfsResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            error!(operation, kind = ?err.kind(), %err, "linkfs call failed");
            None
        }
    }
}

pub fn init_parameters(
    instance_name: &str,
    debug_mode: bool,
    log_level: LogLevel,
    crash_dumps_type: CrashDumpsType,
    crash_dumps_path: &str,
) -> SessionParameters {
    SessionParameters::new(
        instance_name,
        debug_mode,
        log_level,
        crash_dumps_type,
        crash_dumps_path,
    )
}

pub fn init_logging(to_local: bool) {
    report("init_logging", CONTROLLER.init_logging(to_local));
}

pub fn create_vfs(params: &SessionParameters) -> bool {
    report("create_vfs", CONTROLLER.create_vfs(params)).is_some()
}

pub fn connect_vfs(params: &SessionParameters) -> bool {
    report("connect_vfs", CONTROLLER.connect_vfs(params)).is_some()
}

pub fn disconnect_vfs() {
    CONTROLLER.disconnect_vfs();
}

pub fn get_current_vfs_name() -> String {
    CONTROLLER.current_vfs_name()
}

/// Attached process ids, at most 64; the overflow is dropped.
pub fn get_vfs_process_list() -> Vec<u32> {
    report("get_vfs_process_list", CONTROLLER.vfs_process_list())
        .map(|list| list.pids)
        .unwrap_or_default()
}

/// Unknown bits in `flags` are ignored.
pub fn virtual_link_file(source: &str, destination: &str, flags: u32) -> bool {
    report(
        "virtual_link_file",
        CONTROLLER.virtual_link_file(
            Path::new(source),
            Path::new(destination),
            LinkFlags::from_bits_truncate(flags),
        ),
    )
    .is_some()
}

pub fn virtual_link_directory_static(source: &str, destination: &str, flags: u32) -> bool {
    report(
        "virtual_link_directory_static",
        CONTROLLER.virtual_link_directory_static(
            Path::new(source),
            Path::new(destination),
            LinkFlags::from_bits_truncate(flags),
        ),
    )
    .is_some()
}

pub fn remove_virtual_link(source: &str) -> bool {
    report("remove_virtual_link", CONTROLLER.remove_virtual_link(Path::new(source)))
        .unwrap_or(false)
}

pub fn clear_virtual_mappings() -> bool {
    report("clear_virtual_mappings", CONTROLLER.clear_virtual_mappings()).is_some()
}

/// An empty `working_dir` keeps the caller's directory.
pub fn create_process_hooked(command_line: &str, working_dir: &str) -> bool {
    report(
        "create_process_hooked",
        CONTROLLER.create_process_hooked(command_line, Some(Path::new(working_dir))),
    )
    .is_some()
}

pub fn blacklist_executable(name: &str) {
    report("blacklist_executable", CONTROLLER.blacklist_executable(name));
}

pub fn clear_executable_blacklist() {
    report("clear_executable_blacklist", CONTROLLER.clear_executable_blacklist());
}

pub fn force_load_library(process_name: &str, library_path: &str) {
    report(
        "force_load_library",
        CONTROLLER.force_load_library(process_name, Path::new(library_path)),
    );
}

pub fn clear_library_force_loads() {
    report("clear_library_force_loads", CONTROLLER.clear_library_force_loads());
}
