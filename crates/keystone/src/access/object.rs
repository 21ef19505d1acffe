//! # Shared Object
//!
//! The payload plus its embedded lock. Lives behind an `Arc`; the payload
//! is dropped exactly once, on whichever thread releases the last requester
//! or guard.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::marker::PhantomData;

use parking_lot::lock_api::RawRwLock;

use super::borrow::BorrowFlag;
use super::tier::Tier;
use crate::lock::RecursiveLock;

/// Payload and lock, shared by requesters and guards.
///
/// No public surface: the payload is only reachable through a guard, and
/// only a write guard yields `&mut T`.
pub(crate) struct SharedObject<T, Tr: Tier, R: RawRwLock> {
    lock: RecursiveLock<R>,
    borrow: BorrowFlag,
    value: UnsafeCell<T>,
    _tier: PhantomData<Tr>,
}

impl<T, Tr: Tier, R: RawRwLock> SharedObject<T, Tr, R> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            lock: RecursiveLock::new(),
            borrow: BorrowFlag::new(),
            value: UnsafeCell::new(value),
            _tier: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn lock(&self) -> &RecursiveLock<R> {
        &self.lock
    }

    #[inline]
    pub(crate) fn borrow_flag(&self) -> &BorrowFlag {
        &self.borrow
    }

    /// Raw pointer to the payload.
    ///
    /// Dereferencing it is only sound while the caller holds the lock in a
    /// mode that permits the access it makes.
    #[inline]
    pub(crate) fn value_ptr(&self) -> *mut T {
        self.value.get()
    }
}

// SAFETY: under the conservative tier every guard, read or write, takes the
// exclusive mode, so at most one thread touches the payload at a time. That
// only requires moving access between threads (`T: Send`), as for a mutex.
unsafe impl<T: Send, R: RawRwLock + Sync> Sync for SharedObject<T, super::Conservative, R> {}

// SAFETY: read guards of this tier hand out `&T` to several threads at once,
// and write guards hand out `&mut T` on any thread, as for a reader-writer
// lock.
unsafe impl<T: Send + Sync, R: RawRwLock + Sync> Sync
    for SharedObject<T, super::AttestedImmutable, R>
{
}
