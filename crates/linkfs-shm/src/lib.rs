// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Shared instance channel for linkfs sessions
//!
//! A channel is a directory under the runtime root holding the published
//! region files, the writer lock and the attached process markers. Writers
//! publish whole snapshots by atomic rename; readers never take the lock.

pub mod channel;
pub mod liveness;
pub mod lock;
pub mod reader;
pub mod region;
pub mod registry;
pub mod runtime;

pub use channel::InstanceChannel;
pub use liveness::{Liveness, SystemLiveness};
pub use lock::RegionLock;
pub use reader::{LoadedRegion, RegionReader};
pub use region::{FileIdentity, RegionFile};
pub use registry::{ProcessList, ProcessRegistry};
pub use runtime::{RuntimeDir, RUNTIME_DIR_ENV};
