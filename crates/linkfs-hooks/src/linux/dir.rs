// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directory streams over merged listings.
//!
//! `opendir` on a mapped path opens a real directory (the redirection, the
//! placeholder or the path itself) so the handle stays valid for `dirfd` and
//! `closedir`, and remembers the merged listing. `readdir` on such a handle
//! serves the listing instead of the real entries.

use std::collections::HashMap;
use std::os::unix::ffi::OsStrExt;
use std::sync::{Mutex, PoisonError};

use libc::{c_char, c_int, dirent, dirent64, DIR};
use linkfs_core::{Access, ListingEntry};
use once_cell::sync::Lazy;

use super::{redirect, Use};
use crate::listing::{fill_name, DirStream};
use crate::shim::quiesced;

pub(super) struct Synthetic {
    stream: DirStream,
    entry: Box<dirent>,
    entry64: Box<dirent64>,
}

impl Synthetic {
    fn new(listing: Vec<ListingEntry>) -> Self {
        Self {
            stream: DirStream::new(listing),
            entry: Box::new(unsafe { std::mem::zeroed() }),
            entry64: Box::new(unsafe { std::mem::zeroed() }),
        }
    }

    fn next(&mut self) -> *mut dirent {
        let Some((pos, item)) = self.stream.next_entry() else {
            return std::ptr::null_mut();
        };
        let entry = &mut *self.entry;
        entry.d_ino = pos as libc::ino_t;
        entry.d_off = pos as libc::off_t;
        entry.d_reclen = std::mem::size_of::<dirent>() as u16;
        entry.d_type = d_type(item);
        fill_name(&mut entry.d_name, item.name.as_bytes());
        entry
    }

    fn next64(&mut self) -> *mut dirent64 {
        let Some((pos, item)) = self.stream.next_entry() else {
            return std::ptr::null_mut();
        };
        let entry = &mut *self.entry64;
        entry.d_ino = pos as libc::ino64_t;
        entry.d_off = pos as libc::off64_t;
        entry.d_reclen = std::mem::size_of::<dirent64>() as u16;
        entry.d_type = d_type(item);
        fill_name(&mut entry.d_name, item.name.as_bytes());
        entry
    }
}

fn d_type(entry: &ListingEntry) -> u8 {
    if entry.is_dir {
        libc::DT_DIR
    } else {
        libc::DT_REG
    }
}

// Keyed by the DIR* address. The boxed entries stay put while the map grows.
static STREAMS: Lazy<Mutex<HashMap<usize, Synthetic>>> = Lazy::new(|| Mutex::new(HashMap::new()));

pub(super) fn streams() -> std::sync::MutexGuard<'static, HashMap<usize, Synthetic>> {
    STREAMS.lock().unwrap_or_else(PoisonError::into_inner)
}

interpose! {
    unsafe fn opendir(name: *const c_char) -> *mut DIR => |real, shim| {
        let Some(given) = super::c_path(name) else {
            return real(name);
        };
        let Some((abs, listing)) = quiesced(|| {
            let abs = shim.absolute(given)?;
            let listing = shim.list_dir(&abs);
            Some((abs, listing))
        })
        .flatten() else {
            return real(name);
        };
        let target = redirect(shim, name, Access::Read, Use::Lookup);
        let dir = match &target {
            Some(target) => real(target.as_ptr()),
            None => real(name),
        };
        if let (Some(listing), false) = (listing, dir.is_null()) {
            shim.log(|| tracing::trace!(path = %abs.display(), entries = listing.len(), "merged listing"));
            streams().insert(dir as usize, Synthetic::new(listing));
        }
        dir
    }
}

interpose! {
    unsafe fn readdir(dirp: *mut DIR) -> *mut dirent => |real, _shim| {
        if let Some(synthetic) = streams().get_mut(&(dirp as usize)) {
            return synthetic.next();
        }
        real(dirp)
    }
}

interpose! {
    unsafe fn readdir64(dirp: *mut DIR) -> *mut dirent64 => |real, _shim| {
        if let Some(synthetic) = streams().get_mut(&(dirp as usize)) {
            return synthetic.next64();
        }
        real(dirp)
    }
}

interpose! {
    unsafe fn rewinddir(dirp: *mut DIR) -> () => |real, _shim| {
        if let Some(synthetic) = streams().get_mut(&(dirp as usize)) {
            synthetic.stream.rewind();
        }
        real(dirp)
    }
}

// Always forgets the stream, even when the call would otherwise pass
// through, so a recycled DIR* address never inherits a stale listing.
#[no_mangle]
pub unsafe extern "C" fn closedir(dirp: *mut DIR) -> c_int {
    streams().remove(&(dirp as usize));
    match next_fn!(closedir: fn(*mut DIR) -> c_int) {
        Some(next) => next(dirp),
        None => super::real::missing(),
    }
}
