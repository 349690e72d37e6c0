// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for linkfs

use std::io;
use std::path::PathBuf;

/// Broad failure class of a [`LinkfsError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid parameters handed to a constructor or operation.
    Construction,
    /// Creating, joining or using a session failed.
    Session,
    /// A link could not be added or removed.
    Mapping,
    /// A hooked process could not be started.
    Launch,
    /// A bounded result had to be cut short.
    Capacity,
    /// Unclassified operating system failure.
    Io,
}

/// Core error type shared by every linkfs crate
#[derive(thiserror::Error, Debug)]
pub enum LinkfsError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid instance name: {0}")]
    InvalidInstanceName(String),
    #[error("link destination does not exist: {}", .0.display())]
    DestinationMissing(PathBuf),
    #[error("link destination is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("link destination is a directory: {}", .0.display())]
    IsADirectory(PathBuf),
    #[error("a link already exists for {}", .0.display())]
    AlreadyLinked(PathBuf),
    #[error("instance '{0}' already exists")]
    InstanceExists(String),
    #[error("instance '{0}' not found")]
    InstanceNotFound(String),
    #[error("region format mismatch: expected version {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("not connected to an instance")]
    NotConnected,
    #[error("corrupt shared region: {0}")]
    CorruptRegion(String),
    #[error("process launch failed: {0}")]
    Launch(String),
    #[error("capacity exceeded: {0}")]
    Capacity(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl LinkfsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkfsError::InvalidPath(_) | LinkfsError::InvalidInstanceName(_) => {
                ErrorKind::Construction
            }
            LinkfsError::DestinationMissing(_)
            | LinkfsError::NotADirectory(_)
            | LinkfsError::IsADirectory(_)
            | LinkfsError::AlreadyLinked(_) => ErrorKind::Mapping,
            LinkfsError::InstanceExists(_)
            | LinkfsError::InstanceNotFound(_)
            | LinkfsError::VersionMismatch { .. }
            | LinkfsError::NotConnected
            | LinkfsError::CorruptRegion(_) => ErrorKind::Session,
            LinkfsError::Launch(_) => ErrorKind::Launch,
            LinkfsError::Capacity(_) => ErrorKind::Capacity,
            LinkfsError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type LinkfsResult<T> = Result<T, LinkfsError>;
