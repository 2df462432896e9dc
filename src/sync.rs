//! Swaps primitives for their `loom` equivalents under the `loom` feature,
//! so the hot-path modules (`reference`, `proxy`) can be exercised under
//! loom's exhaustive interleaving checker without a separate code path.

#[cfg(feature = "loom")]
pub use loom::cell::Cell;
#[cfg(not(feature = "loom"))]
pub use std::cell::Cell;

#[cfg(feature = "loom")]
pub use loom::sync::atomic::{fence, AtomicBool, AtomicU32, Ordering};
#[cfg(not(feature = "loom"))]
pub use std::sync::atomic::{fence, AtomicBool, AtomicU32, Ordering};

#[cfg(feature = "loom")]
pub use loom::sync::Arc;
#[cfg(not(feature = "loom"))]
pub use std::sync::Arc;

#[cfg(feature = "loom")]
pub use loom::thread;
#[cfg(not(feature = "loom"))]
pub use std::thread;

#[cfg(not(feature = "loom"))]
pub use antidote::Mutex;

/// Registry lock: guards the reference list only. No waiting is ever done
/// while holding it, so the teacher's poison-free `antidote::Mutex` fits
/// (swapped for `loom::sync::Mutex` under the `loom` feature, same as
/// everywhere else in this module).
#[cfg(feature = "loom")]
#[derive(Debug, Default)]
pub struct Mutex<T>(loom::sync::Mutex<T>);

#[cfg(feature = "loom")]
impl<T> Mutex<T> {
    pub fn new(t: T) -> Self {
        Self(loom::sync::Mutex::new(t))
    }

    pub fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
        self.0.lock().unwrap()
    }
}

/// Condvar-paired lock for the retire queue + reclaim state. `antidote`
/// has no condvar counterpart, so this one pairs a plain `std`/`loom`
/// mutex with a `std`/`loom` condvar, ignoring poisoning by unwrapping
/// (destructors are contractually not allowed to panic, so poisoning here
/// only happens on a library bug, not routine use).
#[cfg(not(feature = "loom"))]
pub use std::sync::Condvar;
#[cfg(feature = "loom")]
pub use loom::sync::Condvar;

#[cfg(not(feature = "loom"))]
pub struct CvMutex<T>(std::sync::Mutex<T>);

#[cfg(not(feature = "loom"))]
impl<T> CvMutex<T> {
    pub fn new(t: T) -> Self {
        Self(std::sync::Mutex::new(t))
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(feature = "loom")]
#[derive(Debug, Default)]
pub struct CvMutex<T>(loom::sync::Mutex<T>);

#[cfg(feature = "loom")]
impl<T> CvMutex<T> {
    pub fn new(t: T) -> Self {
        Self(loom::sync::Mutex::new(t))
    }

    pub fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
        self.0.lock().unwrap()
    }
}

/// Wait on `condvar` for up to `dur`, or indefinitely under loom (loom's
/// model checker has no real clock, so a timed wait there degrades to a
/// plain wait — the background poller is never spawned in loom tests for
/// exactly this reason; only `Proxy::retire_sync`'s bounded retry loop
/// relies on this outside of loom, where the retry count itself bounds it).
#[cfg(not(feature = "loom"))]
pub fn cv_wait_timeout<'a, T>(
    condvar: &Condvar,
    guard: std::sync::MutexGuard<'a, T>,
    dur: std::time::Duration,
) -> std::sync::MutexGuard<'a, T> {
    match condvar.wait_timeout(guard, dur) {
        Ok((guard, _)) => guard,
        Err(poisoned) => poisoned.into_inner().0,
    }
}

#[cfg(feature = "loom")]
pub fn cv_wait_timeout<'a, T>(
    condvar: &Condvar,
    guard: loom::sync::MutexGuard<'a, T>,
    _dur: std::time::Duration,
) -> loom::sync::MutexGuard<'a, T> {
    condvar.wait(guard).unwrap()
}
