//! # Spin Lock and the Dual-Lock Protocol
//!
//! A tiny test-and-test-and-set lock for values touched at high frequency
//! outside the tick stages (transforms moved by interpolation or input).
//! Critical sections must be a handful of loads and stores.
//!
//! ## Dual lock
//!
//! ```text
//!  thread 1: A.set_from(B)          thread 2: B.set_from(A)
//!  ──────────────────────           ──────────────────────
//!  dual_lock(A, B)                  dual_lock(B, A)
//!    lock lower address  ───┐  ┌───   lock lower address
//!    lock higher address    │  │      lock higher address
//!                           └──┴──> same order on both threads, no cycle
//! ```
//!
//! ## Safety Note
//!
//! The lock hands out `&mut T` from a shared reference, which needs an
//! `UnsafeCell`. Exclusive access is guaranteed by the `locked` flag.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// Spin-based mutual exclusion around a value.
pub struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: the lock serializes all access to `value`, so sharing it only
// requires the value itself to be sendable between threads.
unsafe impl<T: Send> Send for SpinLock<T> {}
// SAFETY: see above; `&SpinLock<T>` only ever yields `&mut T` under the lock.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates an unlocked lock around `value`.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Spins until the lock is acquired.
    pub fn lock(&self) -> SpinGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            // Wait on a plain load so contended cores don't bounce the line
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    /// Acquires the lock if it is free.
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinGuard { lock: self })
    }

    /// Returns whether the lock is currently held.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Mutable access without locking; `&mut self` proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consumes the lock, returning the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinLock").field("value", &*guard).finish(),
            None => f.debug_struct("SpinLock").field("value", &"<locked>").finish(),
        }
    }
}

/// RAII guard; the lock is released on drop.
pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the guard exists only while `locked` is held by us
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard exists only while `locked` is held by us
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Locks two distinct spin locks in address order.
///
/// The guards come back in argument order regardless of which was taken
/// first, so `dual_lock(a, b)` and `dual_lock(b, a)` running concurrently
/// cannot deadlock.
///
/// # Panics
///
/// Panics if `a` and `b` are the same lock; that would spin forever.
pub fn dual_lock<'a, T>(
    a: &'a SpinLock<T>,
    b: &'a SpinLock<T>,
) -> (SpinGuard<'a, T>, SpinGuard<'a, T>) {
    assert!(
        !std::ptr::eq(a, b),
        "dual_lock called with the same lock twice"
    );
    if a.address() < b.address() {
        let first = a.lock();
        let second = b.lock();
        (first, second)
    } else {
        let second = b.lock();
        let first = a.lock();
        (first, second)
    }
}
