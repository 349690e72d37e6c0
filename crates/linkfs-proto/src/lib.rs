// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! linkfs region protocol: SSZ schemas for the shared session regions
//!
//! The controller writes these regions and every hooked process reads them.
//! Decoding always validates, so a region that decodes is safe to resolve
//! against.

pub mod codec;
pub mod convert;
pub mod messages;
pub mod validation;

pub use codec::{decode_inverse, decode_region, encode_inverse, encode_region, RegionKind};
pub use convert::{bytes_to_path, path_to_bytes};
pub use messages::{
    InverseSnapshot, RegionSnapshot, WireCapturedEntry, WireForceLoad, WireInverseEntry,
    WireLink, WireParameters,
};
pub use validation::{validate_inverse, validate_region, ValidationError};
