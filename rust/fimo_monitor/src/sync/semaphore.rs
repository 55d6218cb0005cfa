use super::monitor::Monitor;
use crate::error::{Error, Result};
use crate::runtime::deadline;
use log::error;
use std::fmt::{Debug, Formatter};
use std::time::{Duration, Instant};

const AVAILABLE: &str = "available";

/// A counting semaphore.
///
/// Permits are not tied to the initial count: [`release`](Self::release) may
/// raise the number of available permits above the value the semaphore was
/// created with.
pub struct CountingSemaphore {
    monitor: Monitor<usize>,
}

impl CountingSemaphore {
    /// Creates a semaphore with `permits` initially available permits.
    pub fn new(permits: usize) -> Self {
        let monitor = Monitor::builder()
            .with_name("counting_semaphore")
            .with_condition(AVAILABLE)
            .build(permits);

        Self { monitor }
    }

    /// Acquires `n` permits, waiting until enough are available.
    ///
    /// Fails with [`Error::InvalidArgument`] if `n` is zero.
    #[inline]
    pub fn acquire(&self, n: usize) -> Result<()> {
        self.acquire_deadline(n, None)
    }

    /// Acquires `n` permits, giving up after `timeout`.
    #[inline]
    pub fn acquire_timeout(&self, n: usize, timeout: Duration) -> Result<()> {
        self.acquire_deadline(n, deadline(Some(timeout)))
    }

    /// Acquires `n` permits before an optional `deadline`.
    pub fn acquire_deadline(&self, n: usize, deadline: Option<Instant>) -> Result<()> {
        Self::check_count(n)?;
        self.monitor.run_exclusive_deadline(deadline, |permits| {
            self.monitor
                .condition(AVAILABLE)?
                .wait_while(permits, deadline, |permits| *permits < n)?;
            **permits -= n;
            Ok(())
        })
    }

    /// Acquires `n` permits if they are available without blocking.
    pub fn try_acquire(&self, n: usize) -> Result<bool> {
        Self::check_count(n)?;
        let Some(mut permits) = self.monitor.try_lock() else {
            return Ok(false);
        };
        if *permits < n {
            return Ok(false);
        }

        *permits -= n;
        Ok(true)
    }

    /// Acquires `n` permits and returns them on drop of the returned guard.
    pub fn permit(&self, n: usize) -> Result<SemaphorePermit<'_>> {
        self.acquire(n)?;
        Ok(SemaphorePermit {
            semaphore: self,
            permits: n,
        })
    }

    /// Returns `n` permits to the semaphore and wakes all waiters.
    ///
    /// All waiters are woken since each may be waiting for a different
    /// number of permits.
    pub fn release(&self, n: usize) -> Result<()> {
        Self::check_count(n)?;
        self.monitor.run_exclusive(|permits| {
            **permits = permits
                .checked_add(n)
                .ok_or_else(|| Error::invalid("permit count overflow"))?;
            self.monitor.condition(AVAILABLE)?.broadcast();
            Ok(())
        })
    }

    /// Number of currently available permits.
    pub fn available_permits(&self) -> Result<usize> {
        self.monitor.run_exclusive(|permits| Ok(**permits))
    }

    fn check_count(n: usize) -> Result<()> {
        if n == 0 {
            Err(Error::invalid("permit count must be positive"))
        } else {
            Ok(())
        }
    }
}

impl Debug for CountingSemaphore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingSemaphore")
            .field("monitor", &self.monitor)
            .finish()
    }
}

/// Permits acquired through [`CountingSemaphore::permit`].
///
/// The permits are released when the guard is dropped.
#[must_use = "if unused the permits are released immediately"]
pub struct SemaphorePermit<'a> {
    semaphore: &'a CountingSemaphore,
    permits: usize,
}

impl SemaphorePermit<'_> {
    /// Number of permits held by the guard.
    #[inline]
    pub fn permits(&self) -> usize {
        self.permits
    }
}

impl Debug for SemaphorePermit<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemaphorePermit")
            .field("permits", &self.permits)
            .finish()
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.semaphore.release(self.permits) {
            error!("Unable to return {} semaphore permits: {}", self.permits, e);
        }
    }
}
