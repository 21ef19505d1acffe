//! # Safety Tiers
//!
//! A tier is chosen once, as a type parameter, when a shared object is
//! created. It decides which lock mode a *read* request takes and cannot be
//! changed afterwards.

/// Lock mode taken by a guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Sole access; excludes every other holder.
    Exclusive,
    /// Concurrent access; excludes only exclusive holders.
    Shared,
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Conservative {}
    impl Sealed for super::AttestedImmutable {}
}

/// Safety tier of a shared object. Sealed: only [`Conservative`] and
/// [`AttestedImmutable`] implement it.
pub trait Tier: sealed::Sealed + Send + Sync + 'static {
    /// Lock mode taken by read guards of this tier.
    const READ_MODE: LockMode;

    /// Human-readable tier name.
    const NAME: &'static str;
}

/// The payload may carry interior mutability reachable through `&T`
/// (`Cell`, `RefCell`, ...). Read guards still take the **exclusive** mode
/// and only narrow the returned reference to `&T`.
///
/// Objects of this tier are shareable across threads whenever `T: Send`,
/// like a mutex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Conservative;

impl Tier for Conservative {
    const READ_MODE: LockMode = LockMode::Exclusive;
    const NAME: &'static str = "conservative";
}

/// The caller attests that the payload exposes no mutable state through
/// `&T`. Read guards take the true **shared** mode, so readers on different
/// threads run concurrently.
///
/// Objects of this tier are shareable across threads only when
/// `T: Send + Sync`, like a reader-writer lock; the `Sync` bound is how the
/// compiler holds the caller to the attestation. Payloads with
/// unsynchronized interior mutability stay usable on a single thread only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AttestedImmutable;

impl Tier for AttestedImmutable {
    const READ_MODE: LockMode = LockMode::Shared;
    const NAME: &'static str = "attested-immutable";
}
