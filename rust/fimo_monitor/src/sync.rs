//! Synchronization primitives
//!
//! This module provides the monitor, a non-reentrant FIFO lock paired with
//! named condition variables, and the structures built on top of it.

mod account;
mod barrier;
mod buffer;
mod condition;
mod counter;
mod lock;
mod monitor;
mod rwlock;
mod semaphore;
pub(crate) mod spin_wait;

pub use account::{Transaction, TransactionKind, TransactionalAccount};
pub use barrier::{BarrierWaitResult, CyclicBarrier};
pub use buffer::{BoundedBuffer, PutError};
pub use condition::MonitorCondition;
pub use counter::MonitorCounter;
pub use lock::{LockId, MonitorLock, ReleaseToken};
pub use monitor::{Builder, Monitor, MonitorGuard};
pub use rwlock::{PriorityReadWriteLock, ReadGuard, RwLockStatus, WriteGuard};
pub use semaphore::{CountingSemaphore, SemaphorePermit};
