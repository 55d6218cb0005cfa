use super::lock::{LockId, MonitorLock, ReleaseToken};
use super::monitor::MonitorGuard;
use crate::error::{Error, IllegalState, Result};
use crate::runtime::{deadline, TaskId, Waiter, WakeupToken};
use log::{debug, trace};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A named condition variable bound to one [`MonitorLock`].
///
/// Conditions follow Mesa semantics: a woken task has to re-acquire the lock
/// before it continues and may find its predicate false again, so waits must
/// always be wrapped in a loop (see [`wait_while`](Self::wait_while)).
/// Signals are not buffered, a signal without waiters is lost.
///
/// The binding to the lock is fixed at construction. Waiting with any other
/// lock fails with [`IllegalState::ForeignLock`].
pub struct MonitorCondition {
    name: Cow<'static, str>,
    lock: LockId,
    wait_set: Mutex<VecDeque<Arc<Waiter>>>,
}

impl MonitorCondition {
    /// Creates a new condition bound to `lock`.
    pub fn new(name: impl Into<Cow<'static, str>>, lock: &MonitorLock) -> Self {
        Self {
            name: name.into(),
            lock: lock.id(),
            wait_set: Mutex::new(VecDeque::new()),
        }
    }

    /// Name of the condition.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks whether the condition is bound to `lock`.
    #[inline]
    pub fn is_bound_to(&self, lock: &MonitorLock) -> bool {
        self.lock == lock.id()
    }

    /// Number of tasks currently waiting on the condition.
    pub fn waiters(&self) -> usize {
        self.wait_set.lock().len()
    }

    /// Releases `lock` and waits on the condition.
    ///
    /// The calling task must hold `lock` through `token`. The lock is
    /// released, handing it to the next queued acquirer if there is one, and
    /// the task is parked until it is signaled. A signaled task re-acquires
    /// `lock` before returning and `token` is renewed for the new
    /// acquisition.
    ///
    /// If `deadline` passes first, the task leaves the wait set and the
    /// function fails with [`Error::Timeout`] **without** re-acquiring the
    /// lock. `token` is stale from then on and the caller must not touch the
    /// protected state.
    pub fn wait_on(
        &self,
        lock: &MonitorLock,
        token: &mut ReleaseToken,
        deadline: Option<Instant>,
    ) -> Result<()> {
        if !self.is_bound_to(lock) {
            return Err(IllegalState::ForeignLock(self.name.to_string()).into());
        }
        lock.validate(token)?;

        // The lock is released while the wait set is locked, so a signaling
        // task never finds a waiter that still holds the lock, and a signal
        // sent after the release always finds it.
        let caller = TaskId::current();
        let waiter = Arc::new(Waiter::new(caller));
        {
            let mut wait_set = self.wait_set.lock();
            wait_set.push_back(Arc::clone(&waiter));
            if let Err(e) = lock.release_with(token) {
                wait_set.retain(|w| !Arc::ptr_eq(w, &waiter));
                return Err(e);
            }
        }
        trace!("{} waiting on `{}`", caller, self.name);

        if waiter.park(deadline).is_none() {
            let mut wait_set = self.wait_set.lock();
            if waiter.token().is_none() {
                wait_set.retain(|w| !Arc::ptr_eq(w, &waiter));
                debug!("{} timed out waiting on `{}`", caller, self.name);
                return Err(Error::Timeout);
            }
        }

        // Once notified the deadline no longer applies.
        *token = lock.acquire_until(None)?;
        Ok(())
    }

    /// Waits on the condition with the lock held by `guard`.
    ///
    /// See [`wait_on`](Self::wait_on).
    #[inline]
    pub fn wait<T: ?Sized>(&self, guard: &mut MonitorGuard<'_, T>) -> Result<()> {
        self.wait_deadline(guard, None)
    }

    /// Waits on the condition for at most `timeout`.
    ///
    /// On timeout the guard is disarmed: it no longer holds the lock and any
    /// attempt to access the protected state through it panics.
    #[inline]
    pub fn wait_timeout<T: ?Sized>(
        &self,
        guard: &mut MonitorGuard<'_, T>,
        timeout: Duration,
    ) -> Result<()> {
        self.wait_deadline(guard, deadline(Some(timeout)))
    }

    /// Waits on the condition until an optional `deadline`.
    pub fn wait_deadline<T: ?Sized>(
        &self,
        guard: &mut MonitorGuard<'_, T>,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let lock = guard.monitor().raw_lock();
        let token = guard.token_mut().ok_or(IllegalState::NotHeld)?;
        let res = self.wait_on(lock, token, deadline);

        // The lock may have been lost, most notably to a timeout.
        if res.is_err() && guard.token_mut().is_some_and(|t| lock.validate(t).is_err()) {
            guard.disarm();
        }
        res
    }

    /// Waits as long as `condition` returns `true`.
    ///
    /// The predicate is evaluated under the lock before every wait. The
    /// `deadline` spans the whole loop, not a single wait.
    pub fn wait_while<T: ?Sized, F>(
        &self,
        guard: &mut MonitorGuard<'_, T>,
        deadline: Option<Instant>,
        mut condition: F,
    ) -> Result<()>
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **guard) {
            self.wait_deadline(guard, deadline)?;
        }
        Ok(())
    }

    /// Wakes up the longest waiting task.
    ///
    /// Returns whether a task was woken up. The woken task only continues
    /// once it has re-acquired the lock.
    pub fn signal(&self) -> bool {
        let mut wait_set = self.wait_set.lock();
        match wait_set.pop_front() {
            Some(waiter) => {
                trace!("Signaling {} on `{}`", waiter.task(), self.name);
                waiter.unpark(WakeupToken::Notified);
                true
            }
            None => false,
        }
    }

    /// Wakes up all waiting tasks.
    ///
    /// Returns the number of tasks woken up. The tasks re-acquire the lock
    /// in the order of its admission queue.
    pub fn broadcast(&self) -> usize {
        let mut wait_set = self.wait_set.lock();
        let num = wait_set.len();
        for waiter in wait_set.drain(..) {
            waiter.unpark(WakeupToken::Notified);
        }

        if num != 0 {
            trace!("Broadcast on `{}` woke {} tasks", self.name, num);
        }
        num
    }
}

impl Debug for MonitorCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorCondition")
            .field("name", &self.name)
            .field("lock", &self.lock)
            .field("waiters", &self.waiters())
            .finish()
    }
}
