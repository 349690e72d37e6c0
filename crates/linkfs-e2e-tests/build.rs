// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;

const SHIM_NAME: &str = "liblinkfs_hooks.so";

fn main() {
    // Make a shim built as a dependency artifact visible at target/<profile>/.
    let profile = env::var("PROFILE").unwrap_or_else(|_| "debug".into());
    let target_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("target")
        .join(&profile);

    let shim_src = target_dir.join("deps").join(SHIM_NAME);
    let shim_dst = target_dir.join(SHIM_NAME);
    if shim_src.exists() && !shim_dst.exists() {
        if let Err(e) = std::fs::copy(&shim_src, &shim_dst) {
            let _ = writeln!(io::stderr(), "Warning: failed to copy shim library: {}", e);
        }
    }

    let _ = writeln!(io::stdout(), "cargo:rerun-if-changed=../linkfs-hooks/src");
    let _ = writeln!(io::stdout(), "cargo:rerun-if-changed=../linkfs-hooks/Cargo.toml");
}
