//! # Shared Object Access
//!
//! Binds lock holds to the lifetime of a guard.
//!
//! ## Data Flow
//!
//! ```text
//!   make_*(value)
//!        │
//!        ▼
//!   ┌────────────┐  clone / read_only()  ┌────────────┐
//!   │ Requester  │ ────────────────────► │ Requester  │   (any thread)
//!   └─────┬──────┘                       └─────┬──────┘
//!         │ write_guard() / read_guard()       │
//!         ▼                                    ▼
//!   ┌────────────┐                       ┌────────────┐
//!   │   Guard    │ ── get() / get_mut() ─► payload     (while held)
//!   └────────────┘                       └────────────┘
//!         │ drop
//!         ▼
//!   lock released, ownership share released
//! ```
//!
//! ## Axes
//!
//! - **Capability**: [`ReadWriteRequester`] or [`ReadOnlyRequester`].
//! - **Tier**: [`Conservative`] (reads take the exclusive mode) or
//!   [`AttestedImmutable`] (reads take the shared mode).

mod borrow;
mod guard;
mod object;
mod requester;
mod tier;

pub use borrow::{PayloadMut, PayloadRef};
pub use guard::{ReadGuard, WriteGuard};
pub use requester::{ReadOnlyRequester, ReadWriteRequester};
pub use tier::{AttestedImmutable, Conservative, LockMode, Tier};

/// Read-write requester, conservative tier.
pub type RwRequester<T> = ReadWriteRequester<T, Conservative>;

/// Read-only requester, conservative tier.
pub type RoRequester<T> = ReadOnlyRequester<T, Conservative>;

/// Read-write requester, attested-immutable tier.
pub type ImmutableRwRequester<T> = ReadWriteRequester<T, AttestedImmutable>;

/// Read-only requester, attested-immutable tier.
pub type ImmutableRoRequester<T> = ReadOnlyRequester<T, AttestedImmutable>;

/// Creates a shared object and its read-write requester (conservative tier).
#[must_use]
pub fn make_shared_read_write<T>(value: T) -> RwRequester<T> {
    ReadWriteRequester::new(value)
}

/// Creates a shared object that is read-only from birth (conservative tier).
#[must_use]
pub fn make_shared_read_only<T>(value: T) -> RoRequester<T> {
    ReadOnlyRequester::new(value)
}

/// Creates a shared object and its read-write requester
/// (attested-immutable tier).
#[must_use]
pub fn make_immutable_shared_read_write<T>(value: T) -> ImmutableRwRequester<T> {
    ReadWriteRequester::new(value)
}

/// Creates a shared object that is read-only from birth
/// (attested-immutable tier).
#[must_use]
pub fn make_immutable_shared_read_only<T>(value: T) -> ImmutableRoRequester<T> {
    ReadOnlyRequester::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_factories_start_with_one_owner() {
        assert_eq!(make_shared_read_write(1_u8).strong_count(), 1);
        assert_eq!(make_shared_read_only(1_u8).strong_count(), 1);
        assert_eq!(make_immutable_shared_read_write(1_u8).strong_count(), 1);
        assert_eq!(make_immutable_shared_read_only(1_u8).strong_count(), 1);
    }

    #[test]
    fn test_factory_read_modes() {
        let conservative = make_shared_read_only(0_u8);
        assert_eq!(conservative.read_guard().unwrap().mode(), LockMode::Exclusive);

        let attested = make_immutable_shared_read_only(0_u8);
        assert_eq!(attested.read_guard().unwrap().mode(), LockMode::Shared);
    }

    #[test]
    fn test_conservative_tier_accepts_interior_mutability() {
        // `Cell` mutates through `&T`; the conservative tier keeps that safe
        // by taking the exclusive mode for reads.
        let hits = make_shared_read_only(Cell::new(0_u32));
        for _ in 0..3 {
            hits.with_read(|cell| cell.set(cell.get() + 1)).unwrap();
        }
        assert_eq!(hits.with_read(Cell::get), Ok(3));
    }
}
