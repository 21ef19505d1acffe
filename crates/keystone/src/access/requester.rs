//! # Access Requesters
//!
//! Cheap, cloneable capability tokens over one shared object. A requester
//! holds no lock; it only asks for guards.
//!
//! | Requester              | write guards | read guards |
//! |------------------------|--------------|-------------|
//! | `ReadWriteRequester`   | yes          | yes         |
//! | `ReadOnlyRequester`    | no           | yes         |
//!
//! A read-only requester is derived from a read-write one (never the other
//! way round), or created read-only from the start.

use std::fmt;
use std::sync::Arc;

use parking_lot::lock_api::RawRwLock;

use super::guard::{Acquire, ReadGuard, WriteGuard};
use super::object::SharedObject;
use super::tier::{Conservative, Tier};
use crate::error::SharedResult;

// =============================================================================
// Read-write requester
// =============================================================================

/// Requests read and write guards over a shared object.
///
/// # Example
///
/// ```rust
/// use keystone::{AttestedImmutable, ReadWriteRequester};
///
/// let counter = ReadWriteRequester::<u64, AttestedImmutable>::new(0);
/// let worker = counter.clone();
///
/// std::thread::spawn(move || {
///     worker.with_write(|n| *n += 1).unwrap();
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(counter.with_read(|n| *n)?, 1);
/// # Ok::<(), keystone::SharedError>(())
/// ```
pub struct ReadWriteRequester<T, Tr: Tier = Conservative, R: RawRwLock = parking_lot::RawRwLock> {
    object: Arc<SharedObject<T, Tr, R>>,
}

impl<T, Tr: Tier, R: RawRwLock> ReadWriteRequester<T, Tr, R> {
    /// Creates a new shared object holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            object: Arc::new(SharedObject::new(value)),
        }
    }

    /// Creates a new shared object whose payload is built by `init`.
    #[must_use]
    pub fn new_with(init: impl FnOnce() -> T) -> Self {
        Self::new(init())
    }

    /// Blocks until the exclusive mode is held and returns a held guard.
    ///
    /// Does not block if this thread already holds a write guard (or a
    /// conservative read guard) over the same object.
    pub fn write_guard(&self) -> WriteGuard<T, Tr, R> {
        WriteGuard::acquire(&self.object, Acquire::Blocking)
    }

    /// Returns a held write guard, or an invalid one if the lock is busy.
    /// Never blocks.
    pub fn try_write_guard(&self) -> WriteGuard<T, Tr, R> {
        WriteGuard::acquire(&self.object, Acquire::Try)
    }

    /// Blocks until a read guard is held.
    ///
    /// # Errors
    ///
    /// [`SharedError::LockBookkeeping`](crate::SharedError::LockBookkeeping)
    /// if a shared-mode hold could not be recorded.
    pub fn read_guard(&self) -> SharedResult<ReadGuard<T, Tr, R>> {
        ReadGuard::acquire(&self.object, Acquire::Blocking)
    }

    /// Returns a held read guard, or an invalid one if the lock is busy.
    /// Never blocks.
    ///
    /// # Errors
    ///
    /// [`SharedError::LockBookkeeping`](crate::SharedError::LockBookkeeping)
    /// if a shared-mode hold could not be recorded.
    pub fn try_read_guard(&self) -> SharedResult<ReadGuard<T, Tr, R>> {
        ReadGuard::acquire(&self.object, Acquire::Try)
    }

    /// Runs `f` with write access, releasing the lock afterwards.
    ///
    /// # Errors
    ///
    /// [`SharedError::BorrowConflict`](crate::SharedError::BorrowConflict)
    /// if an enclosing guard on this thread has the payload borrowed.
    pub fn with_write<U>(&self, f: impl FnOnce(&mut T) -> U) -> SharedResult<U> {
        let mut guard = self.write_guard();
        let mut payload = guard.get_mut()?;
        Ok(f(&mut payload))
    }

    /// Runs `f` with read access, releasing the lock afterwards.
    ///
    /// # Errors
    ///
    /// As for [`read_guard`](Self::read_guard), plus
    /// [`SharedError::BorrowConflict`](crate::SharedError::BorrowConflict)
    /// if an enclosing write guard on this thread has the payload borrowed.
    pub fn with_read<U>(&self, f: impl FnOnce(&T) -> U) -> SharedResult<U> {
        let guard = self.read_guard()?;
        let payload = guard.get()?;
        Ok(f(&payload))
    }

    /// Derives a read-only requester over the same object.
    #[must_use]
    pub fn read_only(&self) -> ReadOnlyRequester<T, Tr, R> {
        ReadOnlyRequester {
            object: Arc::clone(&self.object),
        }
    }

    /// Number of requesters and guards currently sharing the object.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.object)
    }

    /// Returns `true` if both requesters refer to the same object.
    #[must_use]
    pub fn same_object(&self, other: &ReadOnlyRequester<T, Tr, R>) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

impl<T, Tr: Tier, R: RawRwLock> Clone for ReadWriteRequester<T, Tr, R> {
    fn clone(&self) -> Self {
        Self {
            object: Arc::clone(&self.object),
        }
    }
}

impl<T: Default, Tr: Tier, R: RawRwLock> Default for ReadWriteRequester<T, Tr, R> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, Tr: Tier, R: RawRwLock> fmt::Debug for ReadWriteRequester<T, Tr, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadWriteRequester")
            .field("tier", &Tr::NAME)
            .field("strong_count", &self.strong_count())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Read-only requester
// =============================================================================

/// Requests read guards over a shared object. Exposes no way to write.
pub struct ReadOnlyRequester<T, Tr: Tier = Conservative, R: RawRwLock = parking_lot::RawRwLock> {
    object: Arc<SharedObject<T, Tr, R>>,
}

impl<T, Tr: Tier, R: RawRwLock> ReadOnlyRequester<T, Tr, R> {
    /// Creates a new shared object holding `value` that can never be
    /// written through a guard.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            object: Arc::new(SharedObject::new(value)),
        }
    }

    /// Blocks until a read guard is held.
    ///
    /// # Errors
    ///
    /// [`SharedError::LockBookkeeping`](crate::SharedError::LockBookkeeping)
    /// if a shared-mode hold could not be recorded.
    pub fn read_guard(&self) -> SharedResult<ReadGuard<T, Tr, R>> {
        ReadGuard::acquire(&self.object, Acquire::Blocking)
    }

    /// Returns a held read guard, or an invalid one if the lock is busy.
    /// Never blocks.
    ///
    /// # Errors
    ///
    /// [`SharedError::LockBookkeeping`](crate::SharedError::LockBookkeeping)
    /// if a shared-mode hold could not be recorded.
    pub fn try_read_guard(&self) -> SharedResult<ReadGuard<T, Tr, R>> {
        ReadGuard::acquire(&self.object, Acquire::Try)
    }

    /// Runs `f` with read access, releasing the lock afterwards.
    ///
    /// # Errors
    ///
    /// As for [`ReadWriteRequester::with_read`].
    pub fn with_read<U>(&self, f: impl FnOnce(&T) -> U) -> SharedResult<U> {
        let guard = self.read_guard()?;
        let payload = guard.get()?;
        Ok(f(&payload))
    }

    /// Number of requesters and guards currently sharing the object.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.object)
    }
}

impl<T, Tr: Tier, R: RawRwLock> Clone for ReadOnlyRequester<T, Tr, R> {
    fn clone(&self) -> Self {
        Self {
            object: Arc::clone(&self.object),
        }
    }
}

impl<T, Tr: Tier, R: RawRwLock> From<ReadWriteRequester<T, Tr, R>> for ReadOnlyRequester<T, Tr, R> {
    fn from(requester: ReadWriteRequester<T, Tr, R>) -> Self {
        Self {
            object: requester.object,
        }
    }
}

impl<T, Tr: Tier, R: RawRwLock> From<&ReadWriteRequester<T, Tr, R>> for ReadOnlyRequester<T, Tr, R> {
    fn from(requester: &ReadWriteRequester<T, Tr, R>) -> Self {
        requester.read_only()
    }
}

impl<T, Tr: Tier, R: RawRwLock> fmt::Debug for ReadOnlyRequester<T, Tr, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyRequester")
            .field("tier", &Tr::NAME)
            .field("strong_count", &self.strong_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::tier::{AttestedImmutable, LockMode};
    use crate::error::SharedError;

    #[test]
    fn test_write_then_read() {
        let requester: ReadWriteRequester<u32> = ReadWriteRequester::new(1);

        {
            let mut guard = requester.write_guard();
            assert!(guard.is_valid());
            *guard.get_mut().unwrap() += 41;
        }

        let guard = requester.read_guard().unwrap();
        assert_eq!(*guard.get().unwrap(), 42);
    }

    #[test]
    fn test_conservative_read_takes_exclusive_mode() {
        let requester: ReadWriteRequester<u32, Conservative> = ReadWriteRequester::new(0);

        let guard = requester.read_guard().unwrap();
        assert_eq!(guard.mode(), LockMode::Exclusive);
        assert!(requester.object.lock().is_locked_exclusive());
        assert_eq!(requester.object.lock().exclusive_depth_for_current(), 1);
    }

    #[test]
    fn test_attested_read_takes_shared_mode() {
        let requester: ReadWriteRequester<u32, AttestedImmutable> = ReadWriteRequester::new(0);

        let a = requester.read_guard().unwrap();
        let b = requester.read_guard().unwrap();
        assert_eq!(a.mode(), LockMode::Shared);
        assert_eq!(requester.object.lock().shared_depth_for_current(), 2);
        assert!(!requester.object.lock().is_locked_exclusive());

        drop(a);
        drop(b);
        assert!(!requester.object.lock().is_locked());
    }

    #[test]
    fn test_nested_write_guards_share_one_hold() {
        let requester: ReadWriteRequester<u32> = ReadWriteRequester::new(0);
        let other = requester.clone();

        let mut outer = requester.write_guard();
        *outer.get_mut().unwrap() += 1;

        let mut inner = other.write_guard();
        assert!(inner.is_valid());
        *inner.get_mut().unwrap() += 1;
        assert_eq!(requester.object.lock().exclusive_depth_for_current(), 2);

        drop(outer);
        assert!(requester.object.lock().is_locked_exclusive());
        assert_eq!(*inner.get().unwrap(), 2);

        drop(inner);
        assert!(!requester.object.lock().is_locked());
    }

    #[test]
    fn test_overlapping_borrows_across_nested_guards_conflict() {
        let requester: ReadWriteRequester<String> = ReadWriteRequester::new(String::new());

        let mut outer = requester.write_guard();
        let mut inner = requester.write_guard();

        let mut text = outer.get_mut().unwrap();
        text.push('x');

        assert_eq!(
            inner.get_mut().unwrap_err(),
            SharedError::BorrowConflict { guard: "WriteGuard" }
        );
        assert_eq!(
            inner.get().unwrap_err(),
            SharedError::BorrowConflict { guard: "WriteGuard" }
        );

        drop(text);
        inner.get_mut().unwrap().push('y');
        assert_eq!(&*outer.get().unwrap(), "xy");
    }

    #[test]
    fn test_take_invalidates_source() {
        let requester: ReadWriteRequester<u8> = ReadWriteRequester::new(5);

        let mut first = requester.write_guard();
        let mut second = first.take();

        assert!(!first.is_valid());
        assert_eq!(
            first.get().unwrap_err(),
            SharedError::InvalidAccess { guard: "WriteGuard" }
        );
        assert!(matches!(first.get_mut(), Err(SharedError::InvalidAccess { .. })));

        assert!(second.is_valid());
        *second.get_mut().unwrap() = 6;

        // Dropping the invalid husk releases nothing.
        drop(first);
        assert!(requester.object.lock().is_locked_exclusive());

        drop(second);
        assert!(!requester.object.lock().is_locked());
        assert_eq!(requester.with_read(|v| *v), Ok(6));
    }

    #[test]
    fn test_read_guard_take() {
        let requester: ReadOnlyRequester<u8, AttestedImmutable> = ReadOnlyRequester::new(3);

        let mut first = requester.read_guard().unwrap();
        let second = first.take();
        assert!(!first.is_valid());
        assert_eq!(
            first.get().unwrap_err(),
            SharedError::InvalidAccess { guard: "ReadGuard" }
        );
        assert_eq!(*second.get().unwrap(), 3);
        assert_eq!(second.mode(), LockMode::Shared);
    }

    #[test]
    fn test_narrowing_shares_object() {
        let requester: ReadWriteRequester<Vec<u8>> = ReadWriteRequester::new(Vec::new());
        let reader = requester.read_only();

        assert!(requester.same_object(&reader));
        assert_eq!(requester.strong_count(), 2);

        requester.with_write(|v| v.push(9)).unwrap();
        assert_eq!(reader.with_read(Vec::len), Ok(1));

        let converted: ReadOnlyRequester<Vec<u8>> = requester.into();
        assert_eq!(converted.strong_count(), 2);
    }

    #[test]
    fn test_strong_count_includes_guards() {
        let requester: ReadWriteRequester<u8> = ReadWriteRequester::default();
        assert_eq!(requester.strong_count(), 1);

        let guard = requester.write_guard();
        assert_eq!(requester.strong_count(), 2);

        let second = requester.clone();
        assert_eq!(requester.strong_count(), 3);

        drop(guard);
        drop(second);
        assert_eq!(requester.strong_count(), 1);
    }

    #[test]
    fn test_with_write_inside_borrowing_guard_conflicts() {
        let requester: ReadWriteRequester<u8> = ReadWriteRequester::new(0);
        let guard = requester.read_guard().unwrap();
        let payload = guard.get().unwrap();

        assert_eq!(
            requester.with_write(|v| *v = 1),
            Err(SharedError::BorrowConflict { guard: "WriteGuard" })
        );
        assert_eq!(*payload, 0);
    }
}
