// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only
#![cfg_attr(any(test, not(target_os = "linux")), allow(dead_code))]

//! linkfs interception library
//!
//! Loaded into hooked processes through `LD_PRELOAD`. On load it reads the
//! injection contract from the environment, joins the named channel and from
//! then on answers the process's file system calls from the channel's
//! mapping table:
//! - open, stat, access, mkdir, unlink, rmdir and rename see redirected paths
//! - directory streams of mapped directories list the merged view
//! - `getcwd` and `realpath` report virtual names
//! - exec and spawn propagate the injection to children
//!
//! Processes without the contract, or whose image is blacklisted, run
//! untouched.

mod guard;
mod listing;
mod shim;

#[cfg(all(target_os = "linux", not(test)))]
mod linux;
