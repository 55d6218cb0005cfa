use super::monitor::Monitor;
use crate::error::{Error, IllegalState, Result};
use crate::runtime::deadline;
use log::{debug, error};
use std::fmt::{Debug, Formatter};
use std::time::{Duration, Instant};

const CAN_READ: &str = "can_read";
const CAN_WRITE: &str = "can_write";

/// A reader-writer lock preferring writers.
///
/// Any number of readers or at most one writer may hold the lock. A writer
/// registers its request before it starts waiting, and new readers block as
/// long as a request is pending, even if the lock is currently only held by
/// readers. A writer therefore only waits for the readers that were already
/// inside when it arrived. Readers are resumed together once no writer is
/// active or pending.
///
/// The lock does not track which task holds it: any task may release a hold
/// acquired by another one.
pub struct PriorityReadWriteLock {
    monitor: Monitor<RwState>,
}

#[derive(Debug, Default)]
struct RwState {
    active_readers: usize,
    active_writers: usize,
    write_requests: usize,
}

/// Snapshot of the state of a [`PriorityReadWriteLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RwLockStatus {
    /// Number of readers holding the lock.
    pub active_readers: usize,
    /// Number of writers holding the lock, either 0 or 1.
    pub active_writers: usize,
    /// Number of writers waiting for the lock.
    pub waiting_writers: usize,
}

impl PriorityReadWriteLock {
    /// Creates a new unlocked lock.
    pub fn new() -> Self {
        let monitor = Monitor::builder()
            .with_name("priority_rwlock")
            .with_condition(CAN_READ)
            .with_condition(CAN_WRITE)
            .build(RwState::default());

        Self { monitor }
    }

    /// Acquires shared read access.
    ///
    /// Blocks while a writer holds the lock or is waiting for it.
    #[inline]
    pub fn acquire_read(&self) -> Result<()> {
        self.acquire_read_deadline(None)
    }

    /// Acquires shared read access, giving up after `timeout`.
    #[inline]
    pub fn acquire_read_timeout(&self, timeout: Duration) -> Result<()> {
        self.acquire_read_deadline(deadline(Some(timeout)))
    }

    /// Acquires shared read access before an optional `deadline`.
    pub fn acquire_read_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.monitor.run_exclusive_deadline(deadline, |state| {
            self.monitor
                .condition(CAN_READ)?
                .wait_while(state, deadline, |state| {
                    state.active_writers > 0 || state.write_requests > 0
                })?;
            state.active_readers += 1;
            Ok(())
        })
    }

    /// Acquires shared read access if it is available without blocking.
    pub fn try_acquire_read(&self) -> bool {
        let Some(mut state) = self.monitor.try_lock() else {
            return false;
        };
        if state.active_writers > 0 || state.write_requests > 0 {
            return false;
        }

        state.active_readers += 1;
        true
    }

    /// Releases shared read access.
    ///
    /// The last reader to leave wakes one waiting writer. Fails with
    /// [`IllegalState::NotHeld`] if no reader holds the lock.
    pub fn release_read(&self) -> Result<()> {
        self.monitor.run_exclusive(|state| {
            if state.active_readers == 0 {
                return Err(IllegalState::NotHeld.into());
            }

            state.active_readers -= 1;
            if state.active_readers == 0 {
                self.monitor.condition(CAN_WRITE)?.signal();
            }
            Ok(())
        })
    }

    /// Acquires exclusive write access.
    ///
    /// Blocks while readers or another writer hold the lock.
    #[inline]
    pub fn acquire_write(&self) -> Result<()> {
        self.acquire_write_deadline(None)
    }

    /// Acquires exclusive write access, giving up after `timeout`.
    ///
    /// A writer that times out withdraws its request and readers held back by
    /// it are resumed.
    #[inline]
    pub fn acquire_write_timeout(&self, timeout: Duration) -> Result<()> {
        self.acquire_write_deadline(deadline(Some(timeout)))
    }

    /// Acquires exclusive write access before an optional `deadline`.
    pub fn acquire_write_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        let mut requested = false;
        let res = self.monitor.run_exclusive_deadline(deadline, |state| {
            state.write_requests += 1;
            requested = true;
            self.monitor
                .condition(CAN_WRITE)?
                .wait_while(state, deadline, |state| {
                    state.active_readers > 0 || state.active_writers > 0
                })?;
            state.write_requests -= 1;
            state.active_writers += 1;
            Ok(())
        });

        match res {
            Err(Error::Timeout) if requested => self.withdraw_request(),
            res => res,
        }
    }

    // The lock was lost with the timeout, so the request is withdrawn in a
    // separate critical section.
    fn withdraw_request(&self) -> Result<()> {
        self.monitor.run_exclusive(|state| {
            state.write_requests -= 1;
            debug!(
                "Write request withdrawn after timeout, {} requests pending",
                state.write_requests
            );

            if state.active_writers == 0 {
                if state.write_requests == 0 {
                    self.monitor.condition(CAN_READ)?.broadcast();
                } else if state.active_readers == 0 {
                    self.monitor.condition(CAN_WRITE)?.signal();
                }
            }
            Err(Error::Timeout)
        })
    }

    /// Acquires exclusive write access if it is available without blocking.
    ///
    /// Fails if any writer is waiting, to not bypass it.
    pub fn try_acquire_write(&self) -> bool {
        let Some(mut state) = self.monitor.try_lock() else {
            return false;
        };
        if state.active_readers > 0 || state.active_writers > 0 || state.write_requests > 0 {
            return false;
        }

        state.active_writers += 1;
        true
    }

    /// Releases exclusive write access.
    ///
    /// Hands the lock to the next waiting writer if there is one, otherwise
    /// wakes all waiting readers. Fails with [`IllegalState::NotHeld`] if no
    /// writer holds the lock.
    pub fn release_write(&self) -> Result<()> {
        self.monitor.run_exclusive(|state| {
            if state.active_writers == 0 {
                return Err(IllegalState::NotHeld.into());
            }

            state.active_writers -= 1;
            if state.write_requests > 0 {
                self.monitor.condition(CAN_WRITE)?.signal();
            } else {
                self.monitor.condition(CAN_READ)?.broadcast();
            }
            Ok(())
        })
    }

    /// Acquires shared read access, released when the guard is dropped.
    pub fn read(&self) -> Result<ReadGuard<'_>> {
        self.acquire_read()?;
        Ok(ReadGuard { lock: self })
    }

    /// Acquires exclusive write access, released when the guard is dropped.
    pub fn write(&self) -> Result<WriteGuard<'_>> {
        self.acquire_write()?;
        Ok(WriteGuard { lock: self })
    }

    /// Snapshot of the lock state.
    pub fn status(&self) -> Result<RwLockStatus> {
        self.monitor.run_exclusive(|state| {
            Ok(RwLockStatus {
                active_readers: state.active_readers,
                active_writers: state.active_writers,
                waiting_writers: state.write_requests,
            })
        })
    }
}

impl Default for PriorityReadWriteLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for PriorityReadWriteLock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityReadWriteLock")
            .field("monitor", &self.monitor)
            .finish()
    }
}

/// RAII structure releasing shared read access when dropped.
#[must_use = "if unused the read access is released immediately"]
#[derive(Debug)]
pub struct ReadGuard<'a> {
    lock: &'a PriorityReadWriteLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release_read() {
            error!("Unable to release read access: {}", e);
        }
    }
}

/// RAII structure releasing exclusive write access when dropped.
#[must_use = "if unused the write access is released immediately"]
#[derive(Debug)]
pub struct WriteGuard<'a> {
    lock: &'a PriorityReadWriteLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release_write() {
            error!("Unable to release write access: {}", e);
        }
    }
}
