use super::monitor::Monitor;
use crate::error::{Error, Result};
use crate::runtime::deadline;
use std::fmt::{Debug, Formatter};
use std::time::{Duration, Instant};

const CHANGED: &str = "changed";

/// A shared signed counter.
///
/// Every modification wakes the tasks blocked in
/// [`wait_for`](Self::wait_for), which makes the counter usable as a simple
/// latch.
pub struct MonitorCounter {
    monitor: Monitor<i64>,
}

impl MonitorCounter {
    /// Creates a counter starting at `value`.
    pub fn new(value: i64) -> Self {
        let monitor = Monitor::builder()
            .with_name("counter")
            .with_condition(CHANGED)
            .build(value);

        Self { monitor }
    }

    /// Adds one and returns the new value.
    #[inline]
    pub fn increment(&self) -> Result<i64> {
        self.add(1)
    }

    /// Subtracts one and returns the new value.
    #[inline]
    pub fn decrement(&self) -> Result<i64> {
        self.add(-1)
    }

    /// Adds `delta` and returns the new value.
    ///
    /// Fails with [`Error::InvalidArgument`] on overflow.
    pub fn add(&self, delta: i64) -> Result<i64> {
        self.monitor.run_exclusive(|value| {
            **value = value
                .checked_add(delta)
                .ok_or_else(|| Error::invalid("counter overflow"))?;
            self.monitor.condition(CHANGED)?.broadcast();
            Ok(**value)
        })
    }

    /// Current value.
    pub fn get(&self) -> Result<i64> {
        self.monitor.run_exclusive(|value| Ok(**value))
    }

    /// Blocks until the counter equals `target`.
    #[inline]
    pub fn wait_for(&self, target: i64) -> Result<()> {
        self.wait_for_deadline(target, None)
    }

    /// Blocks until the counter equals `target`, giving up after `timeout`.
    #[inline]
    pub fn wait_for_timeout(&self, target: i64, timeout: Duration) -> Result<()> {
        self.wait_for_deadline(target, deadline(Some(timeout)))
    }

    /// Blocks until the counter equals `target` or `deadline` passes.
    pub fn wait_for_deadline(&self, target: i64, deadline: Option<Instant>) -> Result<()> {
        self.monitor.run_exclusive_deadline(deadline, |value| {
            self.monitor
                .condition(CHANGED)?
                .wait_while(value, deadline, |value| *value != target)
        })
    }
}

impl Default for MonitorCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Debug for MonitorCounter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorCounter")
            .field("monitor", &self.monitor)
            .finish()
    }
}
