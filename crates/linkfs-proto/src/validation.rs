// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Structural validation of decoded regions

use std::collections::HashSet;

use linkfs_core::{LinkFlags, LinkfsError, REGION_VERSION};
use thiserror::Error;

use crate::convert::bytes_to_path;
use crate::messages::*;

/// Validation error
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("schema validation failed: {0}")]
    Schema(String),
    #[error("SSZ decoding failed: {0}")]
    SszDecode(String),
    #[error("bad region header: {0}")]
    Header(String),
    #[error("region version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

impl From<ValidationError> for LinkfsError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::VersionMismatch { expected, found } => {
                LinkfsError::VersionMismatch { expected, found }
            }
            other => LinkfsError::CorruptRegion(other.to_string()),
        }
    }
}

fn check_version(version: u32) -> Result<(), ValidationError> {
    if version != REGION_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: REGION_VERSION,
            found: version,
        });
    }
    Ok(())
}

fn check_absolute(what: &str, bytes: &[u8]) -> Result<(), ValidationError> {
    if bytes.is_empty() || bytes.contains(&0) || !bytes_to_path(bytes).is_absolute() {
        return Err(ValidationError::Schema(format!(
            "{what} must be an absolute path"
        )));
    }
    Ok(())
}

/// Validate a decoded main region
pub fn validate_region(region: &RegionSnapshot) -> Result<(), ValidationError> {
    check_version(region.version)?;

    let params = &region.parameters;
    if params.instance_name.is_empty() {
        return Err(ValidationError::Schema(
            "instance name must not be empty".to_string(),
        ));
    }
    if linkfs_core::LogLevel::from_u8(params.log_level).is_none() {
        return Err(ValidationError::Schema(format!(
            "unknown log level {}",
            params.log_level
        )));
    }
    if linkfs_core::CrashDumpsType::from_u8(params.crash_dumps_type).is_none() {
        return Err(ValidationError::Schema(format!(
            "unknown crash dump type {}",
            params.crash_dumps_type
        )));
    }

    let mut seen = HashSet::new();
    for link in &region.links {
        check_absolute("virtual path", &link.virtual_path)?;
        check_absolute("real path", &link.real_path)?;
        if LinkFlags::from_bits(link.flags).is_none() {
            return Err(ValidationError::Schema(format!(
                "unknown link flags {:#x}",
                link.flags
            )));
        }
        if !seen.insert(link.virtual_path.as_slice()) {
            return Err(ValidationError::Schema(
                "duplicate virtual path in mapping table".to_string(),
            ));
        }
        if let Some(captured) = &link.captured {
            if !link.is_dir {
                return Err(ValidationError::Schema(
                    "file links cannot carry a captured listing".to_string(),
                ));
            }
            for entry in captured {
                if entry.rel_path.is_empty() || bytes_to_path(&entry.rel_path).is_absolute() {
                    return Err(ValidationError::Schema(
                        "captured entries must be relative paths".to_string(),
                    ));
                }
            }
        }
    }

    for entry in &region.force_loads {
        if entry.process_name.is_empty() {
            return Err(ValidationError::Schema(
                "force load without a process name".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validate a decoded inverse region
pub fn validate_inverse(inverse: &InverseSnapshot) -> Result<(), ValidationError> {
    check_version(inverse.version)?;
    for entry in &inverse.entries {
        check_absolute("real path", &entry.real_path)?;
        check_absolute("virtual path", &entry.virtual_path)?;
    }
    Ok(())
}
