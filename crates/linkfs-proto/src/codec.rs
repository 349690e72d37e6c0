// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Region file framing.
//!
//! Each region file is a fixed header followed by an SSZ payload:
//!
//! ```text
//! magic "LKFS" | kind u8 | version u32 LE | payload length u32 LE | payload
//! ```

use ssz::{Decode, Encode};

use linkfs_core::REGION_VERSION;

use crate::messages::{InverseSnapshot, RegionSnapshot};
use crate::validation::ValidationError;

pub const MAGIC: &[u8; 4] = b"LKFS";
pub const HEADER_LEN: usize = 4 + 1 + 4 + 4;

/// Which region a file holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RegionKind {
    Main = 1,
    Inverse = 2,
}

fn frame(kind: RegionKind, payload: Vec<u8>) -> Vec<u8> {
    let mut framed = Vec::with_capacity(HEADER_LEN + payload.len());
    framed.extend_from_slice(MAGIC);
    framed.push(kind as u8);
    framed.extend_from_slice(&REGION_VERSION.to_le_bytes());
    framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    framed.extend_from_slice(&payload);
    framed
}

fn unframe(kind: RegionKind, bytes: &[u8]) -> Result<&[u8], ValidationError> {
    if bytes.len() < HEADER_LEN {
        return Err(ValidationError::Header(format!(
            "region too short: {} bytes",
            bytes.len()
        )));
    }
    if &bytes[..4] != MAGIC {
        return Err(ValidationError::Header("bad magic".to_string()));
    }
    if bytes[4] != kind as u8 {
        return Err(ValidationError::Header(format!(
            "expected region kind {}, found {}",
            kind as u8, bytes[4]
        )));
    }
    let version = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
    if version != REGION_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: REGION_VERSION,
            found: version,
        });
    }
    let len = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]) as usize;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != len {
        return Err(ValidationError::Header(format!(
            "payload length {} does not match header {}",
            payload.len(),
            len
        )));
    }
    Ok(payload)
}

pub fn encode_region(region: &RegionSnapshot) -> Vec<u8> {
    frame(RegionKind::Main, region.as_ssz_bytes())
}

/// Decodes and validates a main region file.
pub fn decode_region(bytes: &[u8]) -> Result<RegionSnapshot, ValidationError> {
    let payload = unframe(RegionKind::Main, bytes)?;
    let region = RegionSnapshot::from_ssz_bytes(payload)
        .map_err(|e| ValidationError::SszDecode(format!("{:?}", e)))?;
    region.validate()?;
    Ok(region)
}

pub fn encode_inverse(inverse: &InverseSnapshot) -> Vec<u8> {
    frame(RegionKind::Inverse, inverse.as_ssz_bytes())
}

/// Decodes and validates an inverse region file.
pub fn decode_inverse(bytes: &[u8]) -> Result<InverseSnapshot, ValidationError> {
    let payload = unframe(RegionKind::Inverse, bytes)?;
    let inverse = InverseSnapshot::from_ssz_bytes(payload)
        .map_err(|e| ValidationError::SszDecode(format!("{:?}", e)))?;
    inverse.validate()?;
    Ok(inverse)
}
