// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! fork() in a preloaded process while other threads are inside hooks.

#![cfg(target_os = "linux")]

use std::io::Read;
use std::time::{Duration, Instant};

use linkfs_core::LinkFlags;
use linkfs_e2e_tests::Harness;
use linkfs_test_utils::TestTree;

fn arg(path: std::path::PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

#[linkfs_test_utils::logged_test]
fn fork_proceeds_while_a_thread_blocks_in_open() {
    let tree = TestTree::new().unwrap().dir("pipes").unwrap();
    let harness = Harness::new("fork-blocked");
    harness
        .controller
        .virtual_link_directory_static(&tree.path("virtual/pipes"), &tree.path("pipes"), LinkFlags::empty())
        .unwrap();

    let mut child = harness.spawn_probe(&[
        "fork-while-blocked",
        &arg(tree.path("pipes/fifo")),
        &arg(tree.path("virtual/pipes/fifo")),
    ]);
    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            child.kill().unwrap();
            child.wait().unwrap();
            panic!("fork stalled behind an open blocked on a FIFO");
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    let mut stderr = String::new();
    child.stderr.take().unwrap().read_to_string(&mut stderr).unwrap();
    assert!(status.success(), "{status}: {stderr}");
    let mut stdout = String::new();
    child.stdout.take().unwrap().read_to_string(&mut stdout).unwrap();
    assert_eq!(stdout.lines().collect::<Vec<_>>(), ["forked"]);
}
