//! Host services used by the monitor primitives.
//!
//! The primitives only need three things from the host: an identity for the
//! calling task, a way to suspend a task until another task resumes it, and a
//! monotonic clock for deadlines. This module implements them for OS threads,
//! where every thread is one task.

use crate::sync::spin_wait::SpinWait;
use log::trace;
use parking_lot::{Condvar, Mutex};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Identity of a logical task.
///
/// Ids are unique for the lifetime of the process and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Returns the id of the calling task.
    #[inline]
    pub fn current() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        thread_local! {
            static CURRENT: TaskId = TaskId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        }

        CURRENT.with(|id| *id)
    }

    /// Returns the raw value of the id.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Message passed to a parked task when it is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupToken {
    /// Ownership of a lock was transferred to the woken task.
    Handoff,
    /// The task was removed from a condition by a signal or broadcast.
    Notified,
}

/// Wake handle of one suspended task.
///
/// A waiter is enqueued by the task that wants to block and resumed by
/// exactly one other task through [`Waiter::unpark`]. The token is posted
/// while the owner of the queue is locked, so a task that timed out can
/// decide, under the same lock, whether it lost the race with its waker.
#[derive(Debug)]
pub(crate) struct Waiter {
    task: TaskId,
    token: Mutex<Option<WakeupToken>>,
    cvar: Condvar,
}

impl Waiter {
    /// Creates a waiter for the calling task.
    pub fn new(task: TaskId) -> Self {
        Self {
            task,
            token: Mutex::new(None),
            cvar: Condvar::new(),
        }
    }

    /// Task owning the waiter.
    #[inline]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Returns the posted token, if any.
    #[inline]
    pub fn token(&self) -> Option<WakeupToken> {
        *self.token.lock()
    }

    /// Resumes the parked task with `token`.
    pub fn unpark(&self, token: WakeupToken) {
        let mut slot = self.token.lock();
        debug_assert!(slot.is_none(), "waiter of {} resumed twice", self.task);
        *slot = Some(token);
        self.cvar.notify_one();
    }

    /// Suspends the calling task until it is resumed or `deadline` passes.
    ///
    /// Returns `None` if the deadline passed without a token being posted.
    pub fn park(&self, deadline: Option<Instant>) -> Option<WakeupToken> {
        // Wakeups are usually quick, try spinning before blocking the thread.
        let mut spin_wait = SpinWait::new();
        while spin_wait.spin() {
            if let Some(token) = self.token() {
                return Some(token);
            }
        }

        trace!("Parking {}", self.task);
        let mut slot = self.token.lock();
        loop {
            if let Some(token) = *slot {
                trace!("Unparked {} with {:?}", self.task, token);
                return Some(token);
            }

            match deadline {
                None => self.cvar.wait(&mut slot),
                Some(deadline) => {
                    if self.cvar.wait_until(&mut slot, deadline).timed_out() {
                        return *slot;
                    }
                }
            }
        }
    }
}

/// Converts a relative timeout into an absolute deadline.
///
/// Timeouts too large to be represented are treated as unbounded.
#[inline]
pub(crate) fn deadline(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|timeout| Instant::now().checked_add(timeout))
}
