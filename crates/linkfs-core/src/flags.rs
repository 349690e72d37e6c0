// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Link flag bitset

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Behavior flags attached to a link entry.
///
/// Values match the numeric constants used by the original engine so that
/// callers passing raw integers keep working.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkFlags(u32);

impl LinkFlags {
    /// Reject the link if the virtual path is already mapped.
    pub const FAIL_IF_EXISTS: LinkFlags = LinkFlags(0x1);
    /// Do not capture the destination; consult it live on every lookup.
    pub const MONITOR_CHANGES: LinkFlags = LinkFlags(0x2);
    /// Create the destination when missing and redirect creations into it.
    pub const CREATE_TARGET: LinkFlags = LinkFlags(0x4);
    /// Cover every descendant of a linked directory, not only direct children.
    pub const RECURSIVE: LinkFlags = LinkFlags(0x8);

    const ALL: u32 = 0xF;

    pub const fn empty() -> Self {
        LinkFlags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `None` when unknown bits are set.
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::ALL == 0 {
            Some(LinkFlags(bits))
        } else {
            None
        }
    }

    pub const fn from_bits_truncate(bits: u32) -> Self {
        LinkFlags(bits & Self::ALL)
    }

    pub const fn contains(self, other: LinkFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: LinkFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: LinkFlags) {
        self.0 &= !other.0;
    }

    /// Parses one flag name as used in configuration files and on the command line.
    pub fn parse_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-if-exists" | "failifexists" => Some(Self::FAIL_IF_EXISTS),
            "monitor-changes" | "monitorchanges" => Some(Self::MONITOR_CHANGES),
            "create-target" | "createtarget" => Some(Self::CREATE_TARGET),
            "recursive" => Some(Self::RECURSIVE),
            _ => None,
        }
    }

    fn names(self) -> impl Iterator<Item = &'static str> {
        [
            (Self::FAIL_IF_EXISTS, "fail-if-exists"),
            (Self::MONITOR_CHANGES, "monitor-changes"),
            (Self::CREATE_TARGET, "create-target"),
            (Self::RECURSIVE, "recursive"),
        ]
        .into_iter()
        .filter(move |(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
    }
}

impl BitOr for LinkFlags {
    type Output = LinkFlags;

    fn bitor(self, rhs: LinkFlags) -> LinkFlags {
        LinkFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for LinkFlags {
    fn bitor_assign(&mut self, rhs: LinkFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for LinkFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.names().collect();
        write!(f, "{}", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_independently() {
        let flags = LinkFlags::FAIL_IF_EXISTS | LinkFlags::RECURSIVE;
        assert!(flags.contains(LinkFlags::FAIL_IF_EXISTS));
        assert!(flags.contains(LinkFlags::RECURSIVE));
        assert!(!flags.contains(LinkFlags::CREATE_TARGET));
        assert_eq!(flags.bits(), 0x9);
    }

    #[test]
    fn unknown_bits_are_rejected_or_truncated() {
        assert_eq!(LinkFlags::from_bits(0x10), None);
        assert_eq!(LinkFlags::from_bits_truncate(0x12), LinkFlags::MONITOR_CHANGES);
    }

    #[test]
    fn parse_and_display() {
        assert_eq!(
            LinkFlags::parse_name("CREATE_TARGET"),
            Some(LinkFlags::CREATE_TARGET)
        );
        assert_eq!(LinkFlags::parse_name("bogus"), None);
        let flags = LinkFlags::MONITOR_CHANGES | LinkFlags::RECURSIVE;
        assert_eq!(flags.to_string(), "monitor-changes|recursive");
        assert_eq!(LinkFlags::empty().to_string(), "none");
    }

    #[test]
    fn insert_and_remove() {
        let mut flags = LinkFlags::empty();
        flags.insert(LinkFlags::CREATE_TARGET);
        flags |= LinkFlags::RECURSIVE;
        flags.remove(LinkFlags::CREATE_TARGET);
        assert_eq!(flags, LinkFlags::RECURSIVE);
    }
}
