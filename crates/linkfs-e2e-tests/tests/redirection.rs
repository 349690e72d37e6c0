// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! What a preloaded process sees through its mapping table.

#![cfg(target_os = "linux")]

use std::io::{BufRead, BufReader};

use linkfs_core::LinkFlags;
use linkfs_e2e_tests::Harness;
use linkfs_test_utils::TestTree;

fn tree() -> TestTree {
    TestTree::new()
        .unwrap()
        .file("real/a.txt", "alpha")
        .unwrap()
        .file("game/data/original.esm", "original")
        .unwrap()
        .file("mods/a/plugin.esp", "plugin")
        .unwrap()
        .file("mods/a/textures/sky.dds", "sky")
        .unwrap()
        .dir("overwrite")
        .unwrap()
}

fn arg(path: std::path::PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

#[linkfs_test_utils::logged_test]
fn modtest_read_then_clear() {
    let tree = tree();
    let harness = Harness::new("modtest");
    let virtual_file = arg(tree.path("virtual/a.txt"));

    harness
        .controller
        .virtual_link_file(&tree.path("virtual/a.txt"), &tree.path("real/a.txt"), LinkFlags::empty())
        .unwrap();
    assert_eq!(harness.probe_lines(&["read", &virtual_file]), vec!["alpha"]);

    harness.controller.clear_virtual_mappings().unwrap();
    assert_eq!(harness.probe_lines(&["read", &virtual_file]), vec!["missing"]);
}

#[linkfs_test_utils::logged_test]
fn clear_reaches_running_process() {
    let tree = tree();
    let harness = Harness::new("live-clear");
    harness
        .controller
        .virtual_link_file(&tree.path("virtual/a.txt"), &tree.path("real/a.txt"), LinkFlags::empty())
        .unwrap();

    let gate = tree.path("gate");
    let mut child = harness.spawn_probe(&["read-twice", &arg(tree.path("virtual/a.txt")), &arg(gate.clone())]);
    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();
    assert_eq!(lines.next().unwrap().unwrap(), "alpha");
    assert!(harness.is_attached(child.id()));

    harness.controller.clear_virtual_mappings().unwrap();
    std::fs::write(&gate, "").unwrap();
    assert_eq!(lines.next().unwrap().unwrap(), "missing");
    assert!(child.wait().unwrap().success());
}

#[linkfs_test_utils::logged_test]
fn directory_link_merges_listing() {
    let tree = tree();
    let harness = Harness::new("merge");
    harness
        .controller
        .virtual_link_directory_static(&tree.path("game/data"), &tree.path("mods/a"), LinkFlags::empty())
        .unwrap();

    assert_eq!(
        harness.probe_lines(&["list", &arg(tree.path("game/data"))]),
        vec!["original.esm", "plugin.esp", "textures"]
    );
    assert_eq!(
        harness.probe_lines(&["read", &arg(tree.path("game/data/plugin.esp"))]),
        vec!["plugin"]
    );
    assert_eq!(
        harness.probe_lines(&["read", &arg(tree.path("game/data/original.esm"))]),
        vec!["original"]
    );
    assert_eq!(
        harness.probe_lines(&["stat", &arg(tree.path("game/data/textures"))]),
        vec!["dir"]
    );
}

#[linkfs_test_utils::logged_test]
fn recursive_link_reaches_nested_files() {
    let tree = tree();
    let harness = Harness::new("recursive");
    harness
        .controller
        .virtual_link_directory_static(&tree.path("game/data"), &tree.path("mods/a"), LinkFlags::RECURSIVE)
        .unwrap();

    assert_eq!(
        harness.probe_lines(&["read", &arg(tree.path("game/data/textures/sky.dds"))]),
        vec!["sky"]
    );
}

#[linkfs_test_utils::logged_test]
fn ancestors_of_links_are_virtual_directories() {
    let tree = tree();
    let harness = Harness::new("ancestors");
    harness
        .controller
        .virtual_link_file(
            &tree.path("virtual/nested/deep/a.txt"),
            &tree.path("real/a.txt"),
            LinkFlags::empty(),
        )
        .unwrap();

    assert_eq!(harness.probe_lines(&["stat", &arg(tree.path("virtual/nested"))]), vec!["dir"]);
    assert_eq!(harness.probe_lines(&["list", &arg(tree.path("virtual/nested"))]), vec!["deep"]);
    assert_eq!(
        harness.probe_lines(&["read", &arg(tree.path("virtual/nested/deep/a.txt"))]),
        vec!["alpha"]
    );
    assert!(!tree.exists("virtual"));
}

#[linkfs_test_utils::logged_test]
fn creations_land_in_create_target() {
    let tree = tree();
    let harness = Harness::new("create-target");
    harness
        .controller
        .virtual_link_directory_static(
            &tree.path("virtual/out"),
            &tree.path("overwrite"),
            LinkFlags::CREATE_TARGET,
        )
        .unwrap();

    assert_eq!(
        harness.probe_lines(&["write", &arg(tree.path("virtual/out/new.txt")), "hello"]),
        vec!["ok"]
    );
    assert_eq!(tree.read("overwrite/new.txt").unwrap(), "hello");
}

#[linkfs_test_utils::logged_test]
fn working_directory_stays_virtual() {
    let tree = tree();
    let harness = Harness::new("cwd");
    harness
        .controller
        .virtual_link_directory_static(
            &tree.path("virtual/game"),
            &tree.path("game"),
            LinkFlags::RECURSIVE,
        )
        .unwrap();

    assert_eq!(
        harness.probe_lines(&["cwd", &arg(tree.path("virtual/game"))]),
        vec![arg(tree.path("virtual/game"))]
    );
}

#[linkfs_test_utils::logged_test]
fn children_inherit_the_redirection() {
    let tree = tree();
    let harness = Harness::new("propagation");
    harness
        .controller
        .virtual_link_file(&tree.path("virtual/a.txt"), &tree.path("real/a.txt"), LinkFlags::empty())
        .unwrap();

    assert_eq!(
        harness.probe_lines(&["spawn", "read", &arg(tree.path("virtual/a.txt"))]),
        vec!["alpha"]
    );
}
