//! # Read-Only Shared Pointer
//!
//! For payloads that never change after construction, no lock is needed at
//! all. [`ReadOnlyShared`] is a reference-counted pointer that only ever
//! hands out `&T` and always points at a live value.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Reference-counted, never-null, read-only pointer.
///
/// Beware of payloads with interior mutability: sharing them across threads
/// still requires `T: Sync`.
///
/// # Example
///
/// ```rust
/// let table = keystone::make_read_only_shared([1_u16, 2, 3]);
/// let copy = table.clone();
/// assert_eq!(copy[2], 3);
/// assert!(keystone::ReadOnlyShared::ptr_eq(&table, &copy));
/// ```
pub struct ReadOnlyShared<T: ?Sized> {
    inner: Arc<T>,
}

impl<T> ReadOnlyShared<T> {
    /// Moves `value` into a new shared allocation.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl<T: ?Sized> ReadOnlyShared<T> {
    /// Returns `true` if both pointers share one allocation.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    /// Number of pointers sharing the allocation.
    #[must_use]
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }
}

impl<T: ?Sized> Clone for ReadOnlyShared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> Deref for ReadOnlyShared<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized> AsRef<T> for ReadOnlyShared<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized> From<Arc<T>> for ReadOnlyShared<T> {
    fn from(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ReadOnlyShared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

impl<T: ?Sized + PartialEq> PartialEq for ReadOnlyShared<T> {
    fn eq(&self, other: &Self) -> bool {
        *self.inner == *other.inner
    }
}

impl<T: ?Sized + Eq> Eq for ReadOnlyShared<T> {}

/// Creates a [`ReadOnlyShared`] holding `value`.
#[must_use]
pub fn make_read_only_shared<T>(value: T) -> ReadOnlyShared<T> {
    ReadOnlyShared::new(value)
}
