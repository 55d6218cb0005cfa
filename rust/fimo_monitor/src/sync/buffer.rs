use super::monitor::Monitor;
use crate::error::{Error, Result};
use crate::runtime::deadline;
use std::collections::VecDeque;
use std::fmt::{Debug, Display, Formatter};
use std::time::{Duration, Instant};

const NOT_FULL: &str = "not_full";
const NOT_EMPTY: &str = "not_empty";

/// A fixed capacity FIFO queue shared between producers and consumers.
///
/// [`put`](Self::put) blocks while the buffer is full and
/// [`take`](Self::take) blocks while it is empty.
pub struct BoundedBuffer<T> {
    capacity: usize,
    monitor: Monitor<VecDeque<T>>,
}

impl<T> BoundedBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` items.
    ///
    /// Fails with [`Error::InvalidArgument`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid("buffer capacity must be positive"));
        }

        let monitor = Monitor::builder()
            .with_name("bounded_buffer")
            .with_condition(NOT_FULL)
            .with_condition(NOT_EMPTY)
            .build(VecDeque::with_capacity(capacity));

        Ok(Self { capacity, monitor })
    }

    /// Appends `item`, waiting for space if the buffer is full.
    #[inline]
    pub fn put(&self, item: T) -> Result<(), PutError<T>> {
        self.put_deadline(item, None)
    }

    /// Appends `item`, giving up after `timeout`.
    ///
    /// On timeout the buffer is unchanged and the item is handed back in the
    /// error.
    #[inline]
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), PutError<T>> {
        self.put_deadline(item, deadline(Some(timeout)))
    }

    /// Appends `item` before an optional `deadline`.
    pub fn put_deadline(&self, item: T, deadline: Option<Instant>) -> Result<(), PutError<T>> {
        let mut slot = Some(item);
        let res = self.monitor.run_exclusive_deadline(deadline, |items| {
            let not_empty = self.monitor.condition(NOT_EMPTY)?;
            self.monitor
                .condition(NOT_FULL)?
                .wait_while(items, deadline, |items| items.len() == self.capacity)?;
            // Nothing can fail once the item left the slot.
            items.extend(slot.take());
            not_empty.signal();
            Ok(())
        });

        match (res, slot) {
            (Err(error), Some(item)) => Err(PutError { error, item }),
            (res, _) => {
                debug_assert!(res.is_ok());
                Ok(())
            }
        }
    }

    /// Appends `item` if there is space and the buffer is not contended.
    ///
    /// Returns the item back if it could not be stored.
    pub fn try_put(&self, item: T) -> std::result::Result<(), T> {
        let Some(mut items) = self.monitor.try_lock() else {
            return Err(item);
        };
        if items.len() == self.capacity {
            return Err(item);
        }

        items.push_back(item);
        if let Ok(not_empty) = self.monitor.condition(NOT_EMPTY) {
            not_empty.signal();
        }
        Ok(())
    }

    /// Removes the oldest item, waiting for one if the buffer is empty.
    #[inline]
    pub fn take(&self) -> Result<T> {
        self.take_deadline(None)
    }

    /// Removes the oldest item, giving up after `timeout`.
    #[inline]
    pub fn take_timeout(&self, timeout: Duration) -> Result<T> {
        self.take_deadline(deadline(Some(timeout)))
    }

    /// Removes the oldest item before an optional `deadline`.
    pub fn take_deadline(&self, deadline: Option<Instant>) -> Result<T> {
        self.monitor.run_exclusive_deadline(deadline, |items| {
            let not_empty = self.monitor.condition(NOT_EMPTY)?;
            let item = loop {
                if let Some(item) = items.pop_front() {
                    break item;
                }
                not_empty.wait_deadline(items, deadline)?;
            };
            self.monitor.condition(NOT_FULL)?.signal();
            Ok(item)
        })
    }

    /// Removes the oldest item if one is available without blocking.
    pub fn try_take(&self) -> Option<T> {
        let mut items = self.monitor.try_lock()?;
        let item = items.pop_front()?;
        if let Ok(not_full) = self.monitor.condition(NOT_FULL) {
            not_full.signal();
        }
        Some(item)
    }

    /// Number of buffered items.
    pub fn size(&self) -> Result<usize> {
        self.monitor.run_exclusive(|items| Ok(items.len()))
    }

    /// Maximum number of buffered items.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Checks whether the buffer is empty.
    pub fn is_empty(&self) -> Result<bool> {
        self.monitor.run_exclusive(|items| Ok(items.is_empty()))
    }

    /// Checks whether the buffer is full.
    pub fn is_full(&self) -> Result<bool> {
        self.monitor
            .run_exclusive(|items| Ok(items.len() == self.capacity))
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// Snapshot of the buffered items, oldest first.
    pub fn contents(&self) -> Result<Vec<T>> {
        self.monitor
            .run_exclusive(|items| Ok(items.iter().cloned().collect()))
    }
}

/// Error returned by [`BoundedBuffer::put`] and its timed variants.
///
/// Carries the item that could not be stored.
#[derive(PartialEq, Eq)]
pub struct PutError<T> {
    error: Error,
    item: T,
}

impl<T> PutError<T> {
    /// The reason the item was not stored.
    #[inline]
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Returns the item that could not be stored.
    #[inline]
    pub fn into_inner(self) -> T {
        self.item
    }
}

impl<T> From<PutError<T>> for Error {
    #[inline]
    fn from(err: PutError<T>) -> Self {
        err.error
    }
}

impl<T> Debug for PutError<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> Display for PutError<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unable to store item: {}", self.error)
    }
}

impl<T> std::error::Error for PutError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T: Debug> Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("capacity", &self.capacity)
            .field("monitor", &self.monitor)
            .finish()
    }
}
