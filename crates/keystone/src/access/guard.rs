//! # Access Guards
//!
//! A guard is one lock acquisition plus one share of the object's
//! ownership. It is either **held** (lock acquired, payload reachable) or
//! **invalid** (a non-blocking request found the lock busy, or the hold was
//! moved out with `take`). Dropping a held guard releases exactly the mode
//! it acquired, then its ownership share.
//!
//! ```text
//!   try_*() busy ──────────────────────────► Invalid
//!   *_guard() ──► Held ──── take() ────────► Invalid (hold moves to new guard)
//!                  │
//!                  └────── drop ───────────► Released
//! ```

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::lock_api::RawRwLock;

use super::borrow::{PayloadMut, PayloadRef};
use super::object::SharedObject;
use super::tier::{Conservative, LockMode, Tier};
use crate::error::{SharedError, SharedResult};

/// Whether a request may block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Acquire {
    /// Wait until the lock is available.
    Blocking,
    /// Give up immediately if it is not.
    Try,
}

/// One lock acquisition over a shared object.
///
/// `object` is `None` exactly when the hold is invalid.
struct Hold<T, Tr: Tier, R: RawRwLock> {
    object: Option<Arc<SharedObject<T, Tr, R>>>,
    mode: LockMode,
    // Recursion counts are per-thread: a hold must be released where it was taken.
    _not_send: PhantomData<*const ()>,
}

impl<T, Tr: Tier, R: RawRwLock> Hold<T, Tr, R> {
    fn exclusive(object: &Arc<SharedObject<T, Tr, R>>, how: Acquire) -> Self {
        let held = match how {
            Acquire::Blocking => {
                object.lock().lock_exclusive();
                true
            }
            Acquire::Try => object.lock().try_lock_exclusive(),
        };
        Self::settle(object, LockMode::Exclusive, held)
    }

    fn shared(object: &Arc<SharedObject<T, Tr, R>>, how: Acquire) -> SharedResult<Self> {
        let held = match how {
            Acquire::Blocking => {
                object.lock().lock_shared()?;
                true
            }
            Acquire::Try => object.lock().try_lock_shared()?,
        };
        Ok(Self::settle(object, LockMode::Shared, held))
    }

    fn settle(object: &Arc<SharedObject<T, Tr, R>>, mode: LockMode, held: bool) -> Self {
        Self {
            object: held.then(|| Arc::clone(object)),
            mode,
            _not_send: PhantomData,
        }
    }

    #[inline]
    fn is_held(&self) -> bool {
        self.object.is_some()
    }

    fn take(&mut self) -> Self {
        Self {
            object: self.object.take(),
            mode: self.mode,
            _not_send: PhantomData,
        }
    }

    fn object(&self, guard: &'static str) -> SharedResult<&SharedObject<T, Tr, R>> {
        self.object.as_deref().ok_or_else(|| {
            tracing::debug!(guard, tier = Tr::NAME, "access through invalid guard");
            SharedError::InvalidAccess { guard }
        })
    }

    fn payload_ref(&self, guard: &'static str) -> SharedResult<PayloadRef<'_, T>> {
        let object = self.object(guard)?;
        // SAFETY: this hold owns the lock in `self.mode`; either mode keeps
        // writers on other threads out, and the `Arc` keeps the payload alive
        // for as long as `self` is borrowed.
        unsafe { PayloadRef::try_new(object.value_ptr(), object.borrow_flag()) }
            .ok_or(SharedError::BorrowConflict { guard })
    }

    fn payload_mut(&mut self, guard: &'static str) -> SharedResult<PayloadMut<'_, T>> {
        debug_assert_eq!(self.mode, LockMode::Exclusive);
        let object = self.object(guard)?;
        // SAFETY: this hold owns the exclusive mode and the `Arc` keeps the
        // payload alive for as long as `self` is borrowed.
        unsafe { PayloadMut::try_new(object.value_ptr(), object.borrow_flag()) }
            .ok_or(SharedError::BorrowConflict { guard })
    }
}

impl<T, Tr: Tier, R: RawRwLock> Drop for Hold<T, Tr, R> {
    fn drop(&mut self) {
        // Release the lock before the ownership share: the last share frees
        // the lock along with the payload.
        if let Some(object) = self.object.take() {
            match self.mode {
                LockMode::Exclusive => object.lock().unlock_exclusive(),
                LockMode::Shared => object.lock().unlock_shared(),
            }
        }
    }
}

// =============================================================================
// Write guard
// =============================================================================

/// Exclusive access to a shared object.
///
/// Obtained from a read-write requester. Yields [`PayloadMut`] through
/// [`get_mut`](Self::get_mut). A thread may hold several write guards over
/// the same object at once; the lock is released when the last one drops.
///
/// # Example
///
/// ```rust
/// let requester = keystone::make_shared_read_write(vec![1, 2, 3]);
///
/// let mut guard = requester.write_guard();
/// guard.get_mut()?.push(4);
/// assert_eq!(guard.get()?.len(), 4);
/// # Ok::<(), keystone::SharedError>(())
/// ```
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<T, Tr: Tier = Conservative, R: RawRwLock = parking_lot::RawRwLock> {
    hold: Hold<T, Tr, R>,
}

impl<T, Tr: Tier, R: RawRwLock> WriteGuard<T, Tr, R> {
    const NAME: &'static str = "WriteGuard";

    pub(crate) fn acquire(object: &Arc<SharedObject<T, Tr, R>>, how: Acquire) -> Self {
        Self {
            hold: Hold::exclusive(object, how),
        }
    }

    /// Returns `true` iff the guard holds the lock.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.hold.is_held()
    }

    /// Borrows the payload for reading.
    ///
    /// # Errors
    ///
    /// [`SharedError::InvalidAccess`] if the guard is invalid,
    /// [`SharedError::BorrowConflict`] if another guard on this thread has
    /// the payload mutably borrowed.
    pub fn get(&self) -> SharedResult<PayloadRef<'_, T>> {
        self.hold.payload_ref(Self::NAME)
    }

    /// Borrows the payload for writing.
    ///
    /// # Errors
    ///
    /// [`SharedError::InvalidAccess`] if the guard is invalid,
    /// [`SharedError::BorrowConflict`] if another guard on this thread has
    /// the payload borrowed.
    pub fn get_mut(&mut self) -> SharedResult<PayloadMut<'_, T>> {
        self.hold.payload_mut(Self::NAME)
    }

    /// Moves the hold into a new guard, leaving this one invalid.
    pub fn take(&mut self) -> Self {
        Self {
            hold: self.hold.take(),
        }
    }
}

impl<T, Tr: Tier, R: RawRwLock> fmt::Debug for WriteGuard<T, Tr, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(Self::NAME)
            .field("valid", &self.is_valid())
            .field("tier", &Tr::NAME)
            .finish()
    }
}

// =============================================================================
// Read guard
// =============================================================================

/// Read access to a shared object.
///
/// Under the [`Conservative`] tier this still holds the **exclusive** mode;
/// under [`AttestedImmutable`](super::AttestedImmutable) it holds the
/// shared mode. Either way it only ever yields [`PayloadRef`].
///
/// # Example
///
/// ```rust
/// let requester = keystone::make_immutable_shared_read_only(String::from("frozen"));
///
/// let a = requester.read_guard()?;
/// let b = requester.read_guard()?; // shared mode, reentrant
/// assert_eq!(&*a.get()?, &*b.get()?);
/// # Ok::<(), keystone::SharedError>(())
/// ```
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<T, Tr: Tier = Conservative, R: RawRwLock = parking_lot::RawRwLock> {
    hold: Hold<T, Tr, R>,
}

impl<T, Tr: Tier, R: RawRwLock> ReadGuard<T, Tr, R> {
    const NAME: &'static str = "ReadGuard";

    pub(crate) fn acquire(object: &Arc<SharedObject<T, Tr, R>>, how: Acquire) -> SharedResult<Self> {
        let hold = match Tr::READ_MODE {
            LockMode::Exclusive => Hold::exclusive(object, how),
            LockMode::Shared => Hold::shared(object, how)?,
        };
        Ok(Self { hold })
    }

    /// Returns `true` iff the guard holds the lock.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.hold.is_held()
    }

    /// Lock mode this guard acquired.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.hold.mode
    }

    /// Borrows the payload.
    ///
    /// # Errors
    ///
    /// [`SharedError::InvalidAccess`] if the guard is invalid,
    /// [`SharedError::BorrowConflict`] if a write guard on this thread has
    /// the payload mutably borrowed.
    pub fn get(&self) -> SharedResult<PayloadRef<'_, T>> {
        self.hold.payload_ref(Self::NAME)
    }

    /// Moves the hold into a new guard, leaving this one invalid.
    pub fn take(&mut self) -> Self {
        Self {
            hold: self.hold.take(),
        }
    }
}

impl<T, Tr: Tier, R: RawRwLock> fmt::Debug for ReadGuard<T, Tr, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(Self::NAME)
            .field("valid", &self.is_valid())
            .field("mode", &self.mode())
            .field("tier", &Tr::NAME)
            .finish()
    }
}
