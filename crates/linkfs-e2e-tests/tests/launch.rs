// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Launching processes into a session and tracking their lifetimes.

#![cfg(target_os = "linux")]

use std::time::{Duration, Instant};

use linkfs_e2e_tests::Harness;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(10) {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

fn probe_command_line(harness: &Harness, args: &str) -> String {
    format!("{} {args}", harness.probe.display())
}

#[linkfs_test_utils::logged_test]
fn hooked_launch_is_attached_until_exit() {
    let harness = Harness::new("launch");
    let pid = harness
        .controller
        .create_process_hooked(&probe_command_line(&harness, "sleep 300"), None)
        .unwrap();

    assert!(harness.is_attached(pid));
    assert!(wait_until(|| !harness.is_attached(pid)), "pid {pid} never left the process list");
}

#[linkfs_test_utils::logged_test]
fn blacklisted_launch_runs_unhooked() {
    let harness = Harness::new("blacklist");
    harness.controller.blacklist_executable("linkfs_probe").unwrap();

    let pid = harness
        .controller
        .create_process_hooked(&probe_command_line(&harness, "sleep 2000"), None)
        .unwrap();

    std::thread::sleep(Duration::from_millis(300));
    assert!(kill(Pid::from_raw(pid as i32), None).is_ok(), "probe should still be running");
    assert!(!harness.is_attached(pid));

    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[linkfs_test_utils::logged_test]
fn preloaded_process_registers_itself() {
    let harness = Harness::new("self-attach");
    let mut child = harness.spawn_probe(&["sleep", "2000"]);
    let pid = child.id();

    assert!(wait_until(|| harness.is_attached(pid)), "probe never attached");
    child.kill().unwrap();
    child.wait().unwrap();
    assert!(wait_until(|| !harness.is_attached(pid)), "dead probe still listed");
}

#[linkfs_test_utils::logged_test]
fn session_outlives_a_second_participant() {
    let harness = Harness::new("shared");
    let mut child = harness.spawn_probe(&["sleep", "200"]);
    assert!(child.wait().unwrap().success());

    // The probe detached on exit; the controller keeps the channel alive.
    assert_eq!(harness.controller.current_vfs_name(), "shared");
    assert!(harness.controller.vfs_process_list().unwrap().contains(std::process::id()));
}
