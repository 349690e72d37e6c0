// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

use linkfs_core::{LinkFlags, LinkfsError, SessionParameters, StdHostFs};
use linkfs_shm::{InstanceChannel, RegionReader, RuntimeDir, SystemLiveness};
use linkfs_test_utils::TestTree;

#[linkfs_test_utils::logged_test]
fn test_concurrent_create_has_one_winner() {
    let root = tempfile::tempdir().unwrap();
    let runtime = RuntimeDir::at(root.path());
    let params = SessionParameters::named("race");
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let runtime = runtime.clone();
            let params = params.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                InstanceChannel::create(
                    &runtime,
                    &params,
                    std::process::id(),
                    Arc::new(SystemLiveness),
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(LinkfsError::InstanceExists(_))));
    }
    logger.log(&format!("{} creators, 1 winner", results.len())).unwrap();
}

#[linkfs_test_utils::logged_test]
fn test_concurrent_links_all_land() {
    let tree = TestTree::new().unwrap();
    for i in 0..16 {
        std::fs::write(tree.path(format!("real{i}.txt")), b"x").unwrap();
    }
    let runtime = RuntimeDir::at(tree.path("rt"));
    let channel = Arc::new(
        InstanceChannel::create(
            &runtime,
            &SessionParameters::named("writers"),
            std::process::id(),
            Arc::new(SystemLiveness),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let channel = Arc::clone(&channel);
            let real = tree.path(format!("real{i}.txt"));
            thread::spawn(move || {
                channel
                    .update(|snapshot| {
                        let mut table = snapshot.table();
                        table.link_file(
                            &StdHostFs,
                            Path::new(&format!("/virtual/v{i}.txt")),
                            &real,
                            LinkFlags::empty(),
                        )?;
                        snapshot.set_table(&table);
                        Ok(())
                    })
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let loaded = RegionReader::new(channel.dir()).load_fresh().unwrap();
    assert_eq!(loaded.table.len(), 16);
    assert_eq!(loaded.table.generation(), 16);
}
