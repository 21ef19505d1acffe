//! # Recursive Reader-Writer Lock
//!
//! Reentrant exclusive and shared modes layered over a plain,
//! non-reentrant raw reader-writer lock.
//!
//! ## State
//!
//! ```text
//!   ┌──────────────────────────────────────────────┐
//!   │                RecursiveLock                 │
//!   │                                              │
//!   │  W-admin ─► { owner: ThreadId, depth }       │
//!   │  R-admin ─► { ThreadId ─► depth, ... }       │
//!   │                                              │
//!   │  raw: non-reentrant RwLock (one hold per     │
//!   │       owning thread, never per recursion)    │
//!   └──────────────────────────────────────────────┘
//! ```
//!
//! The admin mutexes only guard O(1) bookkeeping. They are released for
//! the duration of any blocking wait on the raw lock, so an unlocking
//! thread never queues behind a thread that is itself waiting.
//!
//! ## Caveat
//!
//! Modes are tracked independently. A thread holding the exclusive mode
//! that asks for the shared mode (or the other way round) goes to the raw
//! lock and deadlocks, exactly as it would on the raw lock alone.

#![allow(unsafe_code)]

use std::collections::{HashMap, TryReserveError};
use std::thread::{self, ThreadId};

use parking_lot::lock_api::RawRwLock;
use parking_lot::{Mutex, MutexGuard};

use crate::error::{SharedError, SharedResult};

/// Exclusive-mode bookkeeping. `owner` is meaningful only while `depth > 0`.
#[derive(Debug, Default)]
struct ExclusiveState {
    owner: Option<ThreadId>,
    depth: usize,
}

impl ExclusiveState {
    #[inline]
    fn is_owned_by(&self, thread: ThreadId) -> bool {
        self.depth > 0 && self.owner == Some(thread)
    }
}

/// Per-thread shared recursion counts. A thread has an entry iff it holds
/// at least one shared acquisition.
type ReaderMap = HashMap<ThreadId, usize>;

/// A reentrant reader-writer lock.
///
/// The owning thread may re-acquire the exclusive mode any number of times;
/// every thread holding the shared mode may re-acquire it any number of
/// times, even while a writer is queued on the raw lock. Each acquisition
/// must be matched by one release on the same thread.
///
/// `R` is the raw primitive; it defaults to parking_lot's reader-writer lock.
///
/// # Example
///
/// ```rust
/// use keystone::RecursiveLock;
///
/// let lock: RecursiveLock = RecursiveLock::new();
/// lock.lock_exclusive();
/// lock.lock_exclusive(); // same thread, does not block
/// assert_eq!(lock.exclusive_depth_for_current(), 2);
/// lock.unlock_exclusive();
/// lock.unlock_exclusive();
/// assert!(!lock.is_locked());
/// ```
pub struct RecursiveLock<R = parking_lot::RawRwLock>
where
    R: RawRwLock,
{
    /// The non-reentrant primitive.
    raw: R,
    /// W-admin.
    exclusive: Mutex<ExclusiveState>,
    /// R-admin.
    shared: Mutex<ReaderMap>,
    /// Forces the next reader-map reservation to fail.
    #[cfg(test)]
    fail_next_reservation: std::sync::atomic::AtomicBool,
}

impl<R: RawRwLock> RecursiveLock<R> {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_reader_capacity(0)
    }

    /// Creates an unlocked lock whose reader map is pre-sized for
    /// `capacity` concurrently reading threads.
    #[must_use]
    pub fn with_reader_capacity(capacity: usize) -> Self {
        Self {
            raw: R::INIT,
            exclusive: Mutex::new(ExclusiveState::default()),
            shared: Mutex::new(HashMap::with_capacity(capacity)),
            #[cfg(test)]
            fail_next_reservation: std::sync::atomic::AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Exclusive mode
    // =========================================================================

    /// Acquires the exclusive mode, blocking until it is available.
    ///
    /// Returns immediately if the calling thread already owns it.
    pub fn lock_exclusive(&self) {
        let me = thread::current().id();
        let mut state = self.exclusive.lock();

        if state.is_owned_by(me) {
            state.depth += 1;
            tracing::trace!(depth = state.depth, "reentrant exclusive acquisition");
            return;
        }

        MutexGuard::unlocked(&mut state, || self.raw.lock_exclusive());

        debug_assert_eq!(state.depth, 0, "raw exclusive hold granted while depth is non-zero");
        state.owner = Some(me);
        state.depth = 1;
    }

    /// Attempts to acquire the exclusive mode without blocking.
    ///
    /// Always succeeds if the calling thread already owns it.
    #[must_use]
    pub fn try_lock_exclusive(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.exclusive.lock();

        if state.is_owned_by(me) {
            state.depth += 1;
            tracing::trace!(depth = state.depth, "reentrant exclusive acquisition");
            return true;
        }

        if !self.raw.try_lock_exclusive() {
            return false;
        }

        state.owner = Some(me);
        state.depth = 1;
        true
    }

    /// Releases one exclusive acquisition made by the calling thread.
    ///
    /// The raw lock is released when the last one goes. Calling this from a
    /// thread that does not own the exclusive mode is logged and ignored.
    pub fn unlock_exclusive(&self) {
        let me = thread::current().id();
        let mut state = self.exclusive.lock();

        if !state.is_owned_by(me) {
            tracing::error!(
                depth = state.depth,
                "unlock_exclusive called by a thread that does not own the exclusive hold"
            );
            return;
        }

        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            // SAFETY: the depth went 1 -> 0 on the owning thread, which took
            // exactly one raw exclusive hold when it went 0 -> 1.
            unsafe { self.raw.unlock_exclusive() };
        }
    }

    // =========================================================================
    // Shared mode
    // =========================================================================

    /// Acquires the shared mode, blocking until it is available.
    ///
    /// Returns immediately if the calling thread already holds it.
    ///
    /// # Errors
    ///
    /// Returns [`SharedError::LockBookkeeping`] if the new hold cannot be
    /// recorded. The raw shared hold is released before returning.
    pub fn lock_shared(&self) -> SharedResult<()> {
        let me = thread::current().id();
        let mut readers = self.shared.lock();

        if let Some(depth) = readers.get_mut(&me) {
            *depth += 1;
            tracing::trace!(depth = *depth, "reentrant shared acquisition");
            return Ok(());
        }

        MutexGuard::unlocked(&mut readers, || self.raw.lock_shared());

        self.register_reader(&mut readers, me)
    }

    /// Attempts to acquire the shared mode without blocking.
    ///
    /// Always succeeds if the calling thread already holds it.
    ///
    /// # Errors
    ///
    /// Returns [`SharedError::LockBookkeeping`] if the new hold cannot be
    /// recorded. The raw shared hold is released before returning.
    pub fn try_lock_shared(&self) -> SharedResult<bool> {
        let me = thread::current().id();
        let mut readers = self.shared.lock();

        if let Some(depth) = readers.get_mut(&me) {
            *depth += 1;
            tracing::trace!(depth = *depth, "reentrant shared acquisition");
            return Ok(true);
        }

        if !self.raw.try_lock_shared() {
            return Ok(false);
        }

        self.register_reader(&mut readers, me).map(|()| true)
    }

    /// Releases one shared acquisition made by the calling thread.
    ///
    /// The raw lock is released when the thread's last one goes. Calling
    /// this from a thread holding no shared acquisition is logged and
    /// ignored.
    pub fn unlock_shared(&self) {
        let me = thread::current().id();
        let mut readers = self.shared.lock();

        let Some(depth) = readers.get_mut(&me) else {
            tracing::error!("unlock_shared called by a thread that holds no shared acquisition");
            return;
        };

        if *depth > 1 {
            *depth -= 1;
            return;
        }

        readers.remove(&me);
        // SAFETY: the entry existed, so this thread holds exactly one raw
        // shared hold, taken when the entry was inserted.
        unsafe { self.raw.unlock_shared() };
    }

    /// Records a raw shared hold the calling thread has just taken.
    fn register_reader(&self, readers: &mut ReaderMap, me: ThreadId) -> SharedResult<()> {
        // Re-check: the map may have changed while R-admin was released.
        if let Some(depth) = readers.get_mut(&me) {
            *depth += 1;
            // SAFETY: taken by the caller just now; the thread keeps a single
            // raw hold per entry.
            unsafe { self.raw.unlock_shared() };
            return Ok(());
        }

        if let Err(err) = self.reserve_reader_slot(readers) {
            // SAFETY: taken by the caller just now and not yet recorded.
            unsafe { self.raw.unlock_shared() };
            tracing::error!(%err, "could not record shared hold, raw hold released");
            return Err(SharedError::LockBookkeeping(err.to_string()));
        }

        readers.insert(me, 1);
        Ok(())
    }

    #[cfg(not(test))]
    #[inline]
    #[allow(clippy::unused_self)]
    fn reserve_reader_slot(&self, readers: &mut ReaderMap) -> Result<(), TryReserveError> {
        readers.try_reserve(1)
    }

    #[cfg(test)]
    fn reserve_reader_slot(&self, readers: &mut ReaderMap) -> Result<(), TryReserveError> {
        use std::sync::atomic::Ordering;

        if self.fail_next_reservation.swap(false, Ordering::AcqRel) {
            return Vec::<u8>::new().try_reserve(usize::MAX);
        }
        readers.try_reserve(1)
    }

    // =========================================================================
    // Introspection (racy snapshots)
    // =========================================================================

    /// Returns whether the raw lock is held in either mode by anyone.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Returns whether some thread owns the exclusive mode.
    #[must_use]
    pub fn is_locked_exclusive(&self) -> bool {
        self.exclusive.lock().depth > 0
    }

    /// Returns the calling thread's exclusive recursion depth (0 if it does
    /// not own the exclusive mode).
    #[must_use]
    pub fn exclusive_depth_for_current(&self) -> usize {
        let state = self.exclusive.lock();
        if state.is_owned_by(thread::current().id()) {
            state.depth
        } else {
            0
        }
    }

    /// Returns the calling thread's shared recursion depth.
    #[must_use]
    pub fn shared_depth_for_current(&self) -> usize {
        let me = thread::current().id();
        self.shared.lock().get(&me).copied().unwrap_or(0)
    }

    /// Returns the number of distinct threads holding the shared mode.
    #[must_use]
    pub fn shared_holders(&self) -> usize {
        self.shared.lock().len()
    }
}

impl<R: RawRwLock> Default for RecursiveLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RawRwLock> std::fmt::Debug for RecursiveLock<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveLock")
            .field("exclusive_depth", &self.exclusive.lock().depth)
            .field("shared_holders", &self.shared_holders())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    type Lock = RecursiveLock<parking_lot::RawRwLock>;

    #[test]
    fn test_exclusive_recursion() {
        let lock = Lock::new();

        lock.lock_exclusive();
        lock.lock_exclusive();
        assert!(lock.try_lock_exclusive());
        assert_eq!(lock.exclusive_depth_for_current(), 3);

        lock.unlock_exclusive();
        lock.unlock_exclusive();
        assert!(lock.is_locked());
        assert!(lock.is_locked_exclusive());

        lock.unlock_exclusive();
        assert!(!lock.is_locked());
        assert!(!lock.is_locked_exclusive());
        assert_eq!(lock.exclusive_depth_for_current(), 0);
    }

    #[test]
    fn test_exclusive_excludes_other_threads() {
        let lock = Lock::new();
        lock.lock_exclusive();

        std::thread::scope(|s| {
            s.spawn(|| {
                assert!(!lock.try_lock_exclusive());
                assert_eq!(lock.try_lock_shared(), Ok(false));
                assert_eq!(lock.exclusive_depth_for_current(), 0);
            });
        });

        lock.unlock_exclusive();

        std::thread::scope(|s| {
            s.spawn(|| {
                assert!(lock.try_lock_exclusive());
                lock.unlock_exclusive();
            });
        });
    }

    #[test]
    fn test_shared_recursion_single_raw_hold() {
        let lock = Lock::new();

        lock.lock_shared().unwrap();
        lock.lock_shared().unwrap();
        assert_eq!(lock.try_lock_shared(), Ok(true));
        assert_eq!(lock.shared_depth_for_current(), 3);
        assert_eq!(lock.shared_holders(), 1);

        lock.unlock_shared();
        lock.unlock_shared();
        assert!(lock.is_locked());

        lock.unlock_shared();
        assert!(!lock.is_locked());
        assert_eq!(lock.shared_holders(), 0);
        assert_eq!(lock.shared_depth_for_current(), 0);
    }

    #[test]
    fn test_shared_holders_across_threads() {
        let lock = Lock::new();
        lock.lock_shared().unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                lock.lock_shared().unwrap();
                assert_eq!(lock.shared_holders(), 2);
                assert_eq!(lock.shared_depth_for_current(), 1);
                assert!(!lock.try_lock_exclusive());
                lock.unlock_shared();
            });
        });

        assert_eq!(lock.shared_holders(), 1);
        lock.unlock_shared();
        assert!(lock.try_lock_exclusive());
        lock.unlock_exclusive();
    }

    #[test]
    fn test_shared_reentry_with_queued_writer() {
        let lock = Lock::new();
        let writer_done = AtomicBool::new(false);

        lock.lock_shared().unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                lock.lock_exclusive();
                writer_done.store(true, Ordering::Release);
                lock.unlock_exclusive();
            });

            // Give the writer time to park on the raw lock.
            std::thread::sleep(Duration::from_millis(50));

            // Must not queue behind the writer.
            lock.lock_shared().unwrap();
            assert_eq!(lock.shared_depth_for_current(), 2);
            assert!(!writer_done.load(Ordering::Acquire));

            lock.unlock_shared();
            lock.unlock_shared();
        });

        assert!(writer_done.load(Ordering::Acquire));
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_bookkeeping_failure_releases_raw_hold() {
        let lock = Lock::new();
        lock.fail_next_reservation.store(true, Ordering::Release);

        let result = lock.lock_shared();
        assert!(matches!(result, Err(SharedError::LockBookkeeping(_))));
        assert!(!lock.is_locked());
        assert_eq!(lock.shared_holders(), 0);

        // Nothing leaked: a writer gets in immediately.
        assert!(lock.try_lock_exclusive());
        lock.unlock_exclusive();
    }

    #[test]
    fn test_try_bookkeeping_failure_releases_raw_hold() {
        let lock = Lock::new();
        lock.fail_next_reservation.store(true, Ordering::Release);

        assert!(matches!(lock.try_lock_shared(), Err(SharedError::LockBookkeeping(_))));
        assert!(!lock.is_locked());

        assert_eq!(lock.try_lock_shared(), Ok(true));
        lock.unlock_shared();
    }

    #[test]
    fn test_unlock_without_hold_is_ignored() {
        let lock = Lock::new();

        lock.unlock_exclusive();
        lock.unlock_shared();
        assert!(!lock.is_locked());

        lock.lock_exclusive();
        std::thread::scope(|s| {
            s.spawn(|| lock.unlock_exclusive());
        });
        assert!(lock.is_locked_exclusive());
        lock.unlock_exclusive();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_reader_capacity_preallocates() {
        let lock = Lock::with_reader_capacity(16);
        assert!(lock.shared.lock().capacity() >= 16);
        assert!(!lock.is_locked());
    }
}
