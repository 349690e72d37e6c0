// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test infrastructure shared by the linkfs crates.
//!
//! - every test gets a unique log file (see [`logged_test`]);
//! - [`TestTree`] builds throwaway directory trees to link against.

// Lets `#[logged_test]` expand to `::linkfs_test_utils::...` inside this crate.
extern crate self as linkfs_test_utils;

pub mod logging;
pub mod tree;

pub use linkfs_test_utils_macros::logged_test;
pub use logging::{create_unique_test_log, TestLogError, TestLogger, TestOutcome, Verdict};
pub use tree::TestTree;
