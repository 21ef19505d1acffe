//! # KEYSTONE
//!
//! Controlled concurrent access to one heap object shared across threads:
//! - A reentrant reader-writer lock ([`RecursiveLock`])
//! - Cloneable requesters that hand out scope-bound guards
//! - Two safety tiers chosen at creation time
//!
//! ## Architecture Rules
//!
//! 1. **The lock is the only serialization point** - bookkeeping mutexes
//!    guard O(1) work and are never held across a blocking wait
//! 2. **No leaked holds** - a failed acquisition never leaves the raw lock
//!    held but unaccounted
//! 3. **Guards are all-or-nothing** - fully held, or invalid
//!
//! ## Example
//!
//! ```rust
//! use keystone::make_shared_read_write;
//!
//! let scores = make_shared_read_write(Vec::<u32>::new());
//! let reader = scores.read_only();
//!
//! let writer = scores.clone();
//! std::thread::spawn(move || {
//!     let mut guard = writer.write_guard();
//!     guard.get_mut().unwrap().push(7);
//! })
//! .join()
//! .unwrap();
//!
//! let guard = reader.read_guard()?;
//! assert_eq!(guard.get()?.as_slice(), &[7]);
//! # Ok::<(), keystone::SharedError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod access;
pub mod error;
pub mod lock;
pub mod readonly;

pub use access::{
    make_immutable_shared_read_only, make_immutable_shared_read_write, make_shared_read_only,
    make_shared_read_write, AttestedImmutable, Conservative, ImmutableRoRequester,
    ImmutableRwRequester, LockMode, PayloadMut, PayloadRef, ReadGuard, ReadOnlyRequester,
    ReadWriteRequester, RoRequester, RwRequester, Tier, WriteGuard,
};
pub use error::{SharedError, SharedResult};
pub use lock::RecursiveLock;
pub use readonly::{make_read_only_shared, ReadOnlyShared};
