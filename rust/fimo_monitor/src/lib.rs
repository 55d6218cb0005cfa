//! Monitor based synchronization primitives.
//!
//! A [`Monitor`](sync::Monitor) pairs a value with an exclusive lock and a set
//! of named condition variables. The lock admits contending tasks in FIFO
//! order and hands ownership directly to the next queued task on release.
//! Conditions follow Mesa semantics, so every wait is a loop re-checking its
//! predicate under the lock.
//!
//! On top of the monitor the crate provides a [`BoundedBuffer`](sync::BoundedBuffer),
//! a [`CountingSemaphore`](sync::CountingSemaphore), a [`CyclicBarrier`](sync::CyclicBarrier),
//! a writer preferring [`PriorityReadWriteLock`](sync::PriorityReadWriteLock),
//! a [`MonitorCounter`](sync::MonitorCounter) and a
//! [`TransactionalAccount`](sync::TransactionalAccount).
//!
//! Every blocking operation comes in three flavours: without a limit, with a
//! relative timeout and with an absolute deadline. A timed out operation
//! leaves the protected state as it was and fails with
//! [`Error::Timeout`](error::Error::Timeout). A timed out
//! [`put`](sync::BoundedBuffer::put_timeout) hands the item back in a
//! [`PutError`](sync::PutError).
//!
//! The crate logs through the [`log`] facade and never installs a logger.
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    rustdoc::broken_intra_doc_links
)]

pub mod error;
pub mod runtime;
pub mod sync;

pub use error::{Error, IllegalState, Result};
