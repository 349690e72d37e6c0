// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! open, stat, access and namespace changes.

use libc::{c_char, c_int, c_uint, mode_t, FILE};
use linkfs_core::Access;

use super::{open_access, redirect, redirect_at, Use};

fn fopen_access(mode: *const c_char) -> Access {
    if mode.is_null() {
        return Access::Read;
    }
    let mode = unsafe { std::ffi::CStr::from_ptr(mode) }.to_bytes();
    if mode.iter().any(|b| matches!(b, b'w' | b'a')) {
        Access::Create
    } else {
        Access::Read
    }
}

interpose! {
    unsafe fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int => |real, shim| {
        match redirect(shim, path, open_access(flags), Use::Lookup) {
            Some(target) => real(target.as_ptr(), flags, mode),
            None => real(path, flags, mode),
        }
    }
}

interpose! {
    unsafe fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int => |real, shim| {
        match redirect(shim, path, open_access(flags), Use::Lookup) {
            Some(target) => real(target.as_ptr(), flags, mode),
            None => real(path, flags, mode),
        }
    }
}

interpose! {
    unsafe fn openat(dirfd: c_int, path: *const c_char, flags: c_int, mode: mode_t) -> c_int => |real, shim| {
        match redirect_at(shim, dirfd, path, open_access(flags), Use::Lookup) {
            Some(target) => real(dirfd, target.as_ptr(), flags, mode),
            None => real(dirfd, path, flags, mode),
        }
    }
}

interpose! {
    unsafe fn openat64(dirfd: c_int, path: *const c_char, flags: c_int, mode: mode_t) -> c_int => |real, shim| {
        match redirect_at(shim, dirfd, path, open_access(flags), Use::Lookup) {
            Some(target) => real(dirfd, target.as_ptr(), flags, mode),
            None => real(dirfd, path, flags, mode),
        }
    }
}

interpose! {
    unsafe fn creat(path: *const c_char, mode: mode_t) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Create, Use::Lookup) {
            Some(target) => real(target.as_ptr(), mode),
            None => real(path, mode),
        }
    }
}

interpose! {
    unsafe fn fopen(path: *const c_char, mode: *const c_char) -> *mut FILE => |real, shim| {
        match redirect(shim, path, fopen_access(mode), Use::Lookup) {
            Some(target) => real(target.as_ptr(), mode),
            None => real(path, mode),
        }
    }
}

interpose! {
    unsafe fn fopen64(path: *const c_char, mode: *const c_char) -> *mut FILE => |real, shim| {
        match redirect(shim, path, fopen_access(mode), Use::Lookup) {
            Some(target) => real(target.as_ptr(), mode),
            None => real(path, mode),
        }
    }
}

interpose! {
    unsafe fn stat(path: *const c_char, buf: *mut libc::stat) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Read, Use::Lookup) {
            Some(target) => real(target.as_ptr(), buf),
            None => real(path, buf),
        }
    }
}

interpose! {
    unsafe fn lstat(path: *const c_char, buf: *mut libc::stat) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Read, Use::Lookup) {
            Some(target) => real(target.as_ptr(), buf),
            None => real(path, buf),
        }
    }
}

interpose! {
    unsafe fn stat64(path: *const c_char, buf: *mut libc::stat64) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Read, Use::Lookup) {
            Some(target) => real(target.as_ptr(), buf),
            None => real(path, buf),
        }
    }
}

interpose! {
    unsafe fn lstat64(path: *const c_char, buf: *mut libc::stat64) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Read, Use::Lookup) {
            Some(target) => real(target.as_ptr(), buf),
            None => real(path, buf),
        }
    }
}

// Pre-2.33 glibc routes stat() through these versioned entry points.

interpose! {
    unsafe fn __xstat(ver: c_int, path: *const c_char, buf: *mut libc::stat) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Read, Use::Lookup) {
            Some(target) => real(ver, target.as_ptr(), buf),
            None => real(ver, path, buf),
        }
    }
}

interpose! {
    unsafe fn __lxstat(ver: c_int, path: *const c_char, buf: *mut libc::stat) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Read, Use::Lookup) {
            Some(target) => real(ver, target.as_ptr(), buf),
            None => real(ver, path, buf),
        }
    }
}

interpose! {
    unsafe fn __xstat64(ver: c_int, path: *const c_char, buf: *mut libc::stat64) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Read, Use::Lookup) {
            Some(target) => real(ver, target.as_ptr(), buf),
            None => real(ver, path, buf),
        }
    }
}

interpose! {
    unsafe fn __lxstat64(ver: c_int, path: *const c_char, buf: *mut libc::stat64) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Read, Use::Lookup) {
            Some(target) => real(ver, target.as_ptr(), buf),
            None => real(ver, path, buf),
        }
    }
}

interpose! {
    unsafe fn fstatat(dirfd: c_int, path: *const c_char, buf: *mut libc::stat, flags: c_int) -> c_int => |real, shim| {
        match redirect_at(shim, dirfd, path, Access::Read, Use::Lookup) {
            Some(target) => real(dirfd, target.as_ptr(), buf, flags),
            None => real(dirfd, path, buf, flags),
        }
    }
}

interpose! {
    unsafe fn fstatat64(dirfd: c_int, path: *const c_char, buf: *mut libc::stat64, flags: c_int) -> c_int => |real, shim| {
        match redirect_at(shim, dirfd, path, Access::Read, Use::Lookup) {
            Some(target) => real(dirfd, target.as_ptr(), buf, flags),
            None => real(dirfd, path, buf, flags),
        }
    }
}

interpose! {
    unsafe fn statx(
        dirfd: c_int,
        path: *const c_char,
        flags: c_int,
        mask: c_uint,
        buf: *mut libc::statx,
    ) -> c_int => |real, shim| {
        // AT_EMPTY_PATH with "" stats dirfd itself; c_path() treats "" as absent.
        match redirect_at(shim, dirfd, path, Access::Read, Use::Lookup) {
            Some(target) => real(dirfd, target.as_ptr(), flags, mask, buf),
            None => real(dirfd, path, flags, mask, buf),
        }
    }
}

interpose! {
    unsafe fn access(path: *const c_char, mode: c_int) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Read, Use::Lookup) {
            Some(target) => real(target.as_ptr(), mode),
            None => real(path, mode),
        }
    }
}

interpose! {
    unsafe fn faccessat(dirfd: c_int, path: *const c_char, mode: c_int, flags: c_int) -> c_int => |real, shim| {
        match redirect_at(shim, dirfd, path, Access::Read, Use::Lookup) {
            Some(target) => real(dirfd, target.as_ptr(), mode, flags),
            None => real(dirfd, path, mode, flags),
        }
    }
}

interpose! {
    unsafe fn mkdir(path: *const c_char, mode: mode_t) -> c_int => |real, shim| {
        // A virtual directory resolves to the placeholder, so mkdir reports EEXIST.
        match redirect(shim, path, Access::Create, Use::Lookup) {
            Some(target) => real(target.as_ptr(), mode),
            None => real(path, mode),
        }
    }
}

interpose! {
    unsafe fn unlink(path: *const c_char) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Read, Use::Mutation) {
            Some(target) => real(target.as_ptr()),
            None => real(path),
        }
    }
}

interpose! {
    unsafe fn rmdir(path: *const c_char) -> c_int => |real, shim| {
        match redirect(shim, path, Access::Read, Use::Mutation) {
            Some(target) => real(target.as_ptr()),
            None => real(path),
        }
    }
}

interpose! {
    unsafe fn rename(old: *const c_char, new: *const c_char) -> c_int => |real, shim| {
        let old_target = redirect(shim, old, Access::Read, Use::Mutation);
        let new_target = redirect(shim, new, Access::Create, Use::Mutation);
        let old = old_target.as_ref().map_or(old, |t| t.as_ptr());
        let new = new_target.as_ref().map_or(new, |t| t.as_ptr());
        real(old, new)
    }
}

