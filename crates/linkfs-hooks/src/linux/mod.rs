// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! glibc symbol interposition.
//!
//! Each hook is exported under the libc name and forwards to the next
//! definition found with `dlsym(RTLD_NEXT, ..)`. Hooks only act when the
//! process is attached and no other hook runs on the thread; otherwise they
//! call straight through. Lookups against the shim state run inside
//! [`shim::quiesced`](crate::shim::quiesced) sections so a fork never waits
//! on a blocked syscall.

use std::ffi::{CStr, CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use libc::{c_char, c_int};
use linkfs_core::path::normalize;
use linkfs_core::Access;

use crate::shim::{self, Shim, Target};

/// `Option<unsafe extern "C" fn(..) -> R>` for the next definition of `name`.
macro_rules! next_fn {
    ($name:ident : fn($($ty:ty),*) -> $ret:ty) => {{
        static NEXT: ::std::sync::atomic::AtomicUsize = ::std::sync::atomic::AtomicUsize::new(0);
        match $crate::linux::real::cached(&NEXT, concat!(stringify!($name), "\0")) {
            0 => None,
            addr => Some(unsafe {
                ::std::mem::transmute::<usize, unsafe extern "C" fn($($ty),*) -> $ret>(addr)
            }),
        }
    }};
}

/// Exports a hook for `$name`. `$real` calls the next definition, `$shim` is
/// the attached state.
macro_rules! interpose {
    (
        $(#[$meta:meta])*
        unsafe fn $name:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty
            => |$real:ident, $shim:ident| $body:block
    ) => {
        $(#[$meta])*
        #[no_mangle]
        pub unsafe extern "C" fn $name($($arg: $ty),*) -> $ret {
            let $real = |$($arg: $ty),*| -> $ret {
                match next_fn!($name: fn($($ty),*) -> $ret) {
                    Some(next) => unsafe { next($($arg),*) },
                    None => $crate::linux::real::missing(),
                }
            };
            if !$crate::guard::hooks_allowed() {
                return $real($($arg),*);
            }
            let Some($shim) = $crate::shim::active() else {
                return $real($($arg),*);
            };
            let _guard = $crate::guard::HookGuard::new();
            match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| $body)) {
                Ok(value) => value,
                Err(_) => $real($($arg),*),
            }
        }
    };
}

mod cwd;
mod dir;
mod exec;
mod fs;
pub(crate) mod real;

#[ctor::ctor]
fn attach() {
    crate::shim::init();
}

#[ctor::dtor]
fn detach() {
    crate::shim::shutdown();
}

/// How a hook uses the redirected path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Use {
    Lookup,
    Mutation,
}

/// Borrowed path argument; `None` for NULL or empty strings.
pub(crate) unsafe fn c_path<'a>(ptr: *const c_char) -> Option<&'a Path> {
    if ptr.is_null() {
        return None;
    }
    let bytes = CStr::from_ptr(ptr).to_bytes();
    if bytes.is_empty() {
        return None;
    }
    Some(Path::new(OsStr::from_bytes(bytes)))
}

pub(crate) fn to_cstring(path: &Path) -> Option<CString> {
    CString::new(path.as_os_str().as_bytes()).ok()
}

/// Absolute virtual path of `path` taken relative to `dirfd`.
fn absolute_at(shim: &Shim, dirfd: c_int, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() || dirfd == libc::AT_FDCWD {
        return shim.absolute(path);
    }
    let dir = std::fs::read_link(format!("/proc/self/fd/{dirfd}")).ok()?;
    let base = shim.reverse(&dir).unwrap_or(dir);
    normalize(path, Some(&base)).ok()
}

/// Replacement for a path argument, or `None` to keep it.
pub(crate) unsafe fn redirect_at(
    shim: &Shim,
    dirfd: c_int,
    path: *const c_char,
    access: Access,
    usage: Use,
) -> Option<CString> {
    let given = c_path(path)?;
    let target = shim::quiesced(|| {
        let abs = absolute_at(shim, dirfd, given)?;
        Some(shim.resolve(&abs, access))
    })??;
    let replacement = match usage {
        Use::Lookup => target.lookup(),
        Use::Mutation => target.mutation(),
    };
    to_cstring(replacement?)
}

pub(crate) unsafe fn redirect(
    shim: &Shim,
    path: *const c_char,
    access: Access,
    usage: Use,
) -> Option<CString> {
    redirect_at(shim, libc::AT_FDCWD, path, access, usage)
}

/// Virtual path and resolution of a path argument.
pub(crate) unsafe fn resolve_arg(
    shim: &Shim,
    path: *const c_char,
    access: Access,
) -> Option<(PathBuf, Target)> {
    let given = c_path(path)?;
    shim::quiesced(|| {
        let abs = shim.absolute(given)?;
        let target = shim.resolve(&abs, access);
        Some((abs, target))
    })?
}

pub(crate) fn open_access(flags: c_int) -> Access {
    if flags & libc::O_CREAT != 0 {
        Access::Create
    } else {
        Access::Read
    }
}

/// Copies `value` into a caller buffer of `size` bytes, or into a fresh
/// `malloc` allocation when `buf` is NULL.
pub(crate) unsafe fn write_c_path(value: &Path, buf: *mut c_char, size: usize) -> *mut c_char {
    let Some(value) = to_cstring(value) else {
        real::set_errno(libc::EINVAL);
        return std::ptr::null_mut();
    };
    if buf.is_null() {
        return libc::strdup(value.as_ptr());
    }
    let bytes = value.as_bytes_with_nul();
    if bytes.len() > size {
        real::set_errno(libc::ERANGE);
        return std::ptr::null_mut();
    }
    std::ptr::copy_nonoverlapping(bytes.as_ptr().cast::<c_char>(), buf, bytes.len());
    buf
}
