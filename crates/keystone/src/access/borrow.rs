//! # Payload Borrows
//!
//! Exclusive holds nest, so one thread can own several live guards over the
//! same object. The lock alone cannot stop those guards from handing out
//! overlapping `&mut T`; a per-object borrow flag does.
//!
//! ```text
//!   flag  0  ──► free
//!   flag  n  ──► n PayloadRef alive
//!   flag -1  ──► one PayloadMut alive
//! ```

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicIsize, Ordering};

/// Borrow state of one shared payload.
#[derive(Debug, Default)]
pub(crate) struct BorrowFlag(AtomicIsize);

impl BorrowFlag {
    pub(crate) const fn new() -> Self {
        Self(AtomicIsize::new(0))
    }

    fn try_shared(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n >= 0).then_some(n + 1)
            })
            .is_ok()
    }

    fn release_shared(&self) {
        self.0.fetch_sub(1, Ordering::Release);
    }

    fn try_exclusive(&self) -> bool {
        self.0
            .compare_exchange(0, -1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release_exclusive(&self) {
        self.0.store(0, Ordering::Release);
    }

    /// Current raw state (test helper).
    #[cfg(test)]
    pub(crate) fn state(&self) -> isize {
        self.0.load(Ordering::Acquire)
    }
}

/// Read access to a payload, borrowed from a guard.
///
/// Dereferences to `&T`. Dropping it ends the borrow; the guard (and its
/// lock hold) stays alive.
pub struct PayloadRef<'g, T> {
    value: &'g T,
    flag: &'g BorrowFlag,
    _not_send: PhantomData<*const ()>,
}

impl<'g, T> PayloadRef<'g, T> {
    /// Registers a shared borrow and dereferences `ptr`.
    ///
    /// Returns `None` if a mutable borrow is alive.
    ///
    /// # Safety
    ///
    /// The caller must hold the payload's lock in a mode that keeps writers
    /// on other threads out for `'g`, and `ptr` must stay valid for `'g`.
    pub(crate) unsafe fn try_new(ptr: *const T, flag: &'g BorrowFlag) -> Option<Self> {
        if !flag.try_shared() {
            return None;
        }
        Some(Self {
            // SAFETY: no `PayloadMut` is alive (flag >= 0) and the caller's
            // lock hold excludes writers elsewhere.
            value: &*ptr,
            flag,
            _not_send: PhantomData,
        })
    }
}

impl<T> Deref for PayloadRef<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.value
    }
}

impl<T> Drop for PayloadRef<'_, T> {
    fn drop(&mut self) {
        self.flag.release_shared();
    }
}

impl<T: fmt::Debug> fmt::Debug for PayloadRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.value, f)
    }
}

/// Write access to a payload, borrowed from a write guard.
///
/// Dereferences to `&mut T`. Dropping it ends the borrow; the guard (and its
/// lock hold) stays alive.
pub struct PayloadMut<'g, T> {
    value: &'g mut T,
    flag: &'g BorrowFlag,
    _not_send: PhantomData<*const ()>,
}

impl<'g, T> PayloadMut<'g, T> {
    /// Registers the exclusive borrow and dereferences `ptr`.
    ///
    /// Returns `None` if any other borrow is alive.
    ///
    /// # Safety
    ///
    /// The caller must hold the payload's lock in exclusive mode for `'g`,
    /// and `ptr` must stay valid for `'g`.
    pub(crate) unsafe fn try_new(ptr: *mut T, flag: &'g BorrowFlag) -> Option<Self> {
        if !flag.try_exclusive() {
            return None;
        }
        Some(Self {
            // SAFETY: no other borrow is alive (flag was 0) and the exclusive
            // hold keeps every other thread out.
            value: &mut *ptr,
            flag,
            _not_send: PhantomData,
        })
    }
}

impl<T> Deref for PayloadMut<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.value
    }
}

impl<T> DerefMut for PayloadMut<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

impl<T> Drop for PayloadMut<'_, T> {
    fn drop(&mut self) {
        self.flag.release_exclusive();
    }
}

impl<T: fmt::Debug> fmt::Debug for PayloadMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.value, f)
    }
}
