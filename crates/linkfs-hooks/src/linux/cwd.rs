// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Working directory and canonical names in the virtual view.

use std::path::Path;

use libc::{c_char, c_int, size_t};
use linkfs_core::Access;

use super::{c_path, resolve_arg, to_cstring, write_c_path};
use crate::shim::{quiesced, Target};

interpose! {
    unsafe fn chdir(path: *const c_char) -> c_int => |real, shim| {
        let Some((abs, target)) = resolve_arg(shim, path, Access::Read) else {
            return real(path);
        };
        match target.lookup().and_then(to_cstring) {
            Some(dir) => {
                let rc = real(dir.as_ptr());
                if rc == 0 {
                    // The kernel reports the canonical name; remember that one.
                    if let Ok(now) = std::env::current_dir() {
                        quiesced(|| shim.set_cwd(abs, now));
                    }
                }
                rc
            }
            None => {
                let rc = real(path);
                if rc == 0 {
                    quiesced(|| shim.clear_cwd());
                }
                rc
            }
        }
    }
}

interpose! {
    unsafe fn getcwd(buf: *mut c_char, size: size_t) -> *mut c_char => |real, shim| {
        let result = real(buf, size);
        let Some(real_cwd) = c_path(result).map(Path::to_path_buf) else {
            return result;
        };
        let Some(virtual_cwd) = quiesced(|| shim.virtual_cwd_of(&real_cwd)).flatten() else {
            return result;
        };
        if buf.is_null() {
            libc::free(result.cast());
        }
        write_c_path(&virtual_cwd, buf, size)
    }
}

interpose! {
    unsafe fn realpath(path: *const c_char, resolved: *mut c_char) -> *mut c_char => |real, shim| {
        let Some((abs, target)) = resolve_arg(shim, path, Access::Read) else {
            return real(path, resolved);
        };
        match target {
            Target::Keep => real(path, resolved),
            Target::Placeholder(_) => write_c_path(&abs, resolved, libc::PATH_MAX as usize),
            Target::Real(real_path) => {
                let Some(real_c) = to_cstring(&real_path) else {
                    return real(path, resolved);
                };
                let canonical = real(real_c.as_ptr(), std::ptr::null_mut());
                if canonical.is_null() {
                    return canonical;
                }
                let virtual_path = c_path(canonical)
                    .and_then(|p| quiesced(|| shim.reverse(p)).flatten())
                    .unwrap_or(abs);
                libc::free(canonical.cast());
                write_c_path(&virtual_path, resolved, libc::PATH_MAX as usize)
            }
        }
    }
}
