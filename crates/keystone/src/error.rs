//! # Shared Access Error Types
//!
//! All errors that can surface from the lock and its access guards.
//!
//! Contention is not an error: non-blocking requests report "busy" by
//! returning an invalid guard.

use thiserror::Error;

/// Errors that can occur while requesting or using shared access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// A guard that holds no lock was dereferenced.
    ///
    /// Happens when a non-blocking request failed, or the hold was moved
    /// out with `take`.
    #[error("attempt to use invalid guard: {guard}")]
    InvalidAccess {
        /// Name of the guard type that was misused.
        guard: &'static str,
    },

    /// The per-thread recursion map could not record a new shared hold.
    ///
    /// The underlying shared hold has already been released when this is
    /// returned, so the lock is never left held but unaccounted.
    #[error("lock bookkeeping failed: {0}")]
    LockBookkeeping(String),

    /// The payload is already borrowed incompatibly through another guard
    /// held by the same thread (possible once exclusive holds nest).
    #[error("payload already borrowed through another guard: {guard}")]
    BorrowConflict {
        /// Name of the guard type whose borrow was refused.
        guard: &'static str,
    },
}

/// Result type for shared access operations.
pub type SharedResult<T> = Result<T, SharedError>;
