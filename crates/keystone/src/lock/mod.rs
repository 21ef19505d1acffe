//! # Locking Primitives
//!
//! ## The Problem
//!
//! ```text
//! Thread 1:  read_guard()  ──► holds shared
//! Thread 2:  write_guard() ──► parks, waiting for thread 1
//! Thread 1:  read_guard()  ──► plain RwLock: queues behind thread 2 → DEADLOCK
//! ```
//!
//! A raw reader-writer lock has no notion of an owning thread, so nested
//! acquisitions on one thread either deadlock or are undefined.
//!
//! ## The Solution: Per-Thread Recursion Counts
//!
//! [`RecursiveLock`] keeps one raw hold per owning thread and counts the
//! nested acquisitions on top of it. Only the first acquisition touches the
//! raw lock; only the last release gives it back.

mod recursive;

pub use recursive::RecursiveLock;
