//! Process-exit hook, installed once per family.
//!
//! On Unix the hook goes through `atexit`, so it runs when `main` returns
//! or `std::process::exit` is called. Other targets rely on thread-exit
//! teardown of the family table alone.

#![allow(unsafe_code)]

use std::any::{type_name, TypeId};
use std::panic;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::global;

/// Families whose hook is already installed in this process.
static HOOKED: Mutex<Vec<TypeId>> = Mutex::new(Vec::new());

/// Install the exit hook for `(T, N)` unless it already is.
///
/// Returns `true` only for the call that installed it.
pub(crate) fn install<T: 'static, const N: usize>() -> bool {
    let family = global::family_id::<T, N>();
    let mut hooked = HOOKED
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if hooked.contains(&family) {
        return false;
    }
    if !register_atexit(run::<T, N>) {
        warn!(
            family = type_name::<T>(),
            array_size = N,
            "could not install process-exit hook"
        );
        return false;
    }
    hooked.push(family);
    debug!(
        family = type_name::<T>(),
        array_size = N,
        "installed process-exit hook"
    );
    true
}

extern "C" fn run<T: 'static, const N: usize>() {
    // Unwinding out of an `extern "C"` fn aborts; a panicking element
    // destructor must not take the remaining exit handlers with it.
    let _ = panic::catch_unwind(|| {
        // SAFETY: the process is exiting and `main` has returned, so no
        // borrow into tracked memory is still in use.
        unsafe { global::shutdown_family::<T, N>() }
    });
}

#[cfg(unix)]
fn register_atexit(hook: extern "C" fn()) -> bool {
    // SAFETY: `hook` captures no state and never unwinds.
    unsafe { libc::atexit(hook) == 0 }
}

#[cfg(not(unix))]
fn register_atexit(_hook: extern "C" fn()) -> bool {
    false
}
