// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Lookup of the next definition of an interposed symbol.

use std::sync::atomic::{AtomicUsize, Ordering};

use libc::c_int;

/// Address of the next definition of `name` (NUL terminated), cached in
/// `slot`; 0 when there is none.
pub fn cached(slot: &AtomicUsize, name: &'static str) -> usize {
    let addr = slot.load(Ordering::Relaxed);
    if addr != 0 {
        return addr;
    }
    let addr = unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr().cast()) } as usize;
    slot.store(addr, Ordering::Relaxed);
    addr
}

/// Value a call returns when it fails with `errno` set.
pub trait Failure {
    fn failure() -> Self;
}

impl Failure for c_int {
    fn failure() -> Self {
        -1
    }
}

impl<T> Failure for *mut T {
    fn failure() -> Self {
        std::ptr::null_mut()
    }
}

impl Failure for () {
    fn failure() -> Self {}
}

pub fn errno() -> c_int {
    unsafe { *libc::__errno_location() }
}

pub fn set_errno(code: c_int) {
    unsafe { *libc::__errno_location() = code };
}

/// Outcome of a symbol without a next definition.
pub fn missing<R: Failure>() -> R {
    set_errno(libc::ENOSYS);
    R::failure()
}
