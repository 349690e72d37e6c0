// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Merged directory listings handed out one entry at a time.

use linkfs_core::ListingEntry;

/// Cursor over a merged listing, starting with `.` and `..`.
#[derive(Debug)]
pub struct DirStream {
    entries: Vec<ListingEntry>,
    pos: usize,
}

impl DirStream {
    pub fn new(merged: Vec<ListingEntry>) -> Self {
        let mut entries = Vec::with_capacity(merged.len() + 2);
        entries.push(ListingEntry::new(".", true));
        entries.push(ListingEntry::new("..", true));
        entries.extend(merged);
        Self { entries, pos: 0 }
    }

    /// Next entry and its position; positions start at 1 so they can double
    /// as inode and offset cookies.
    pub fn next_entry(&mut self) -> Option<(u64, &ListingEntry)> {
        let entry = self.entries.get(self.pos)?;
        self.pos += 1;
        Some((self.pos as u64, entry))
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }
}

/// Copies `name` into a fixed `d_name` buffer, NUL terminated, cutting
/// names that do not fit.
pub fn fill_name(dest: &mut [libc::c_char], name: &[u8]) {
    let Some(max) = dest.len().checked_sub(1) else {
        return;
    };
    let len = name.len().min(max);
    for (slot, byte) in dest.iter_mut().zip(&name[..len]) {
        *slot = *byte as libc::c_char;
    }
    dest[len] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_yields_dot_entries_then_listing() {
        let mut stream = DirStream::new(vec![
            ListingEntry::new("a.txt", false),
            ListingEntry::new("sub", true),
        ]);
        let names: Vec<String> = std::iter::from_fn(|| {
            stream
                .next_entry()
                .map(|(_, e)| e.name.to_string_lossy().into_owned())
        })
        .collect();
        assert_eq!(names, [".", "..", "a.txt", "sub"]);
        assert!(stream.next_entry().is_none());

        stream.rewind();
        let (pos, first) = stream.next_entry().unwrap();
        assert_eq!(pos, 1);
        assert_eq!(first.name, ".");
    }

    #[test]
    fn names_are_terminated_and_cut() {
        let mut buf = [1 as libc::c_char; 4];
        fill_name(&mut buf, b"ab");
        assert_eq!(buf, [b'a' as libc::c_char, b'b' as libc::c_char, 0, 1]);

        fill_name(&mut buf, b"abcdef");
        assert_eq!(buf[3], 0);
        assert_eq!(buf[2], b'c' as libc::c_char);
    }
}
