// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Propagation into new processes.
//!
//! Every exec variant re-applies the injection contract to the environment it
//! passes on, so children load the library even when the caller rebuilt the
//! environment from scratch. Blacklisted images get a clean environment.
//! Spawned and forked children are registered with the channel right away.

use std::ffi::{CStr, CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use libc::{c_char, c_int, pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};
use linkfs_core::Access;

use super::real::{errno, missing, set_errno};
use super::{c_path, to_cstring};
use crate::guard::{hooks_allowed, HookGuard};
use crate::shim::{self, Shim, Target};

extern "C" {
    static environ: *const *const c_char;
}

/// A NUL-terminated `envp` array that owns its strings.
struct CEnv {
    _strings: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl CEnv {
    fn new(pairs: &[(OsString, OsString)]) -> Self {
        let strings: Vec<CString> = pairs
            .iter()
            .filter_map(|(name, value)| {
                let mut entry = name.as_bytes().to_vec();
                entry.push(b'=');
                entry.extend_from_slice(value.as_bytes());
                CString::new(entry).ok()
            })
            .collect();
        let mut ptrs: Vec<*const c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        Self {
            _strings: strings,
            ptrs,
        }
    }

    fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }
}

/// Name/value pairs of `envp`, or of the process environment when NULL.
/// Entries without `=` are dropped.
unsafe fn env_pairs(envp: *const *const c_char) -> Vec<(OsString, OsString)> {
    let envp = if envp.is_null() { environ } else { envp };
    let mut pairs = Vec::new();
    if envp.is_null() {
        return pairs;
    }
    let mut cursor = envp;
    while !(*cursor).is_null() {
        let entry = CStr::from_ptr(*cursor).to_bytes();
        if let Some(eq) = entry.iter().position(|b| *b == b'=') {
            pairs.push((
                OsStr::from_bytes(&entry[..eq]).to_os_string(),
                OsStr::from_bytes(&entry[eq + 1..]).to_os_string(),
            ));
        }
        cursor = cursor.add(1);
    }
    pairs
}

struct Prepared {
    image: Option<CString>,
    env: CEnv,
    blacklisted: bool,
}

impl Prepared {
    /// `search` marks the PATH-searching variants, whose bare names are left
    /// to the real lookup.
    unsafe fn new(shim: &Shim, file: *const c_char, envp: *const *const c_char, search: bool) -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        let mut image = None;
        if let Some(given) = c_path(file) {
            if search && !given.as_os_str().as_bytes().contains(&b'/') {
                candidates.push(given.to_path_buf());
            } else if let Some(abs) = shim.absolute(given) {
                if let Target::Real(real) = shim.resolve(&abs, Access::Read) {
                    image = to_cstring(&real);
                    candidates.push(real);
                }
                candidates.push(abs);
            }
        }

        let mut pairs = env_pairs(envp);
        let names: Vec<&Path> = candidates.iter().map(PathBuf::as_path).collect();
        let blacklisted = shim.exec_env(&names, &mut pairs);
        Self {
            image,
            env: CEnv::new(&pairs),
            blacklisted,
        }
    }

    fn image_or(&self, file: *const c_char) -> *const c_char {
        self.image.as_ref().map_or(file, |image| image.as_ptr())
    }

    /// Runs an exec. A blacklisted image replaces this process outside the
    /// session, so the process leaves the registry first and rejoins if the
    /// exec fails. Leaving never removes the channel.
    fn exec(&self, shim: &Shim, call: impl FnOnce(*const *const c_char) -> c_int) -> c_int {
        if self.blacklisted {
            shim::quiesced(|| shim.suspend());
        }
        let rc = call(self.env.as_ptr());
        if self.blacklisted {
            let saved = errno();
            shim::quiesced(|| shim.attach(shim.pid()));
            set_errno(saved);
        }
        rc
    }

    /// Runs a spawn and registers the child on success.
    unsafe fn spawn(&self, shim: &Shim, pid: *mut pid_t, call: impl FnOnce(*const *mut c_char) -> c_int) -> c_int {
        let rc = call(self.env.as_ptr().cast());
        if rc == 0 && !self.blacklisted && !pid.is_null() {
            let child = *pid as u32;
            shim::quiesced(|| shim.attach(child));
        }
        rc
    }
}

interpose! {
    unsafe fn execve(
        path: *const c_char,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> c_int => |real, shim| {
        let Some(prepared) = shim::quiesced(|| Prepared::new(shim, path, envp, false)) else {
            return real(path, argv, envp);
        };
        prepared.exec(shim, |env| real(prepared.image_or(path), argv, env))
    }
}

interpose! {
    unsafe fn execv(path: *const c_char, argv: *const *const c_char) -> c_int => |real, shim| {
        let Some(prepared) = shim::quiesced(|| Prepared::new(shim, path, std::ptr::null(), false)) else {
            return real(path, argv);
        };
        prepared.exec(shim, |env| {
            match next_fn!(execve: fn(*const c_char, *const *const c_char, *const *const c_char) -> c_int) {
                Some(execve) => execve(prepared.image_or(path), argv, env),
                None => missing(),
            }
        })
    }
}

interpose! {
    unsafe fn execvp(file: *const c_char, argv: *const *const c_char) -> c_int => |real, shim| {
        let Some(prepared) = shim::quiesced(|| Prepared::new(shim, file, std::ptr::null(), true)) else {
            return real(file, argv);
        };
        prepared.exec(shim, |env| {
            match next_fn!(execvpe: fn(*const c_char, *const *const c_char, *const *const c_char) -> c_int) {
                Some(execvpe) => execvpe(prepared.image_or(file), argv, env),
                None => missing(),
            }
        })
    }
}

interpose! {
    unsafe fn execvpe(
        file: *const c_char,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> c_int => |real, shim| {
        let Some(prepared) = shim::quiesced(|| Prepared::new(shim, file, envp, true)) else {
            return real(file, argv, envp);
        };
        prepared.exec(shim, |env| real(prepared.image_or(file), argv, env))
    }
}

interpose! {
    unsafe fn posix_spawn(
        pid: *mut pid_t,
        path: *const c_char,
        file_actions: *const posix_spawn_file_actions_t,
        attrp: *const posix_spawnattr_t,
        argv: *const *mut c_char,
        envp: *const *mut c_char,
    ) -> c_int => |real, shim| {
        let Some(prepared) = shim::quiesced(|| Prepared::new(shim, path, envp.cast(), false)) else {
            return real(pid, path, file_actions, attrp, argv, envp);
        };
        prepared.spawn(shim, pid, |env| {
            real(pid, prepared.image_or(path), file_actions, attrp, argv, env)
        })
    }
}

interpose! {
    unsafe fn posix_spawnp(
        pid: *mut pid_t,
        file: *const c_char,
        file_actions: *const posix_spawn_file_actions_t,
        attrp: *const posix_spawnattr_t,
        argv: *const *mut c_char,
        envp: *const *mut c_char,
    ) -> c_int => |real, shim| {
        let Some(prepared) = shim::quiesced(|| Prepared::new(shim, file, envp.cast(), true)) else {
            return real(pid, file, file_actions, attrp, argv, envp);
        };
        prepared.spawn(shim, pid, |env| {
            real(pid, prepared.image_or(file), file_actions, attrp, argv, env)
        })
    }
}

// Not routed through interpose!: fork takes the exclusive side of the lock
// that hooks hold shared while they touch the shim state.
#[no_mangle]
pub unsafe extern "C" fn fork() -> pid_t {
    let Some(next) = next_fn!(fork: fn() -> pid_t) else {
        return missing();
    };
    let shim = match shim::active() {
        Some(shim) if hooks_allowed() => shim,
        _ => return next(),
    };

    let pid = {
        let _quiesced = shim::fork_write();
        let _streams = super::dir::streams();
        next()
    };
    if pid == 0 {
        let _guard = HookGuard::new();
        shim.after_fork(std::process::id());
    }
    pid
}
