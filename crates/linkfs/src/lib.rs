// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! linkfs session control
//!
//! [`Controller`] creates or joins a session, edits its mapping table and
//! launches hooked processes into it. [`compat`] exposes the same operations
//! as plain functions returning `bool` over one process-wide controller.
//!
//! ```no_run
//! use std::path::Path;
//! use linkfs::{Controller, LinkFlags, SessionParameters};
//!
//! # fn main() -> linkfs::LinkfsResult<()> {
//! let controller = Controller::default();
//! controller.create_vfs(&SessionParameters::named("modtest"))?;
//! controller.virtual_link_file(
//!     Path::new("/virtual/a.txt"),
//!     Path::new("/real/a.txt"),
//!     LinkFlags::empty(),
//! )?;
//! controller.create_process_hooked("cat /virtual/a.txt", None)?;
//! # Ok(())
//! # }
//! ```

pub mod compat;
pub mod controller;
pub mod launch;

pub use controller::Controller;
pub use launch::LaunchPlan;
pub use linkfs_core::{
    CrashDumpsType, ErrorKind, LinkFlags, LinkfsError, LinkfsResult, LogLevel, Mapping,
    SessionParameters,
};
pub use linkfs_shm::ProcessList;
