use super::condition::MonitorCondition;
use super::lock::{MonitorLock, ReleaseToken};
use crate::error::{Error, Result};
use crate::runtime::deadline;
use log::error;
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::cell::UnsafeCell;
use std::fmt::{Debug, Display, Formatter};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// A state container guarded by one [`MonitorLock`].
///
/// The protected value can only be reached through a [`MonitorGuard`], which
/// is only handed out while the calling task holds the lock. Conditions are
/// registered by name at construction through the [`Builder`] and share the
/// lock of the monitor.
///
/// The lock is not reentrant. Locking a monitor from within one of its own
/// critical sections fails with
/// [`IllegalState::Reentrant`](crate::error::IllegalState::Reentrant).
///
/// ```
/// use fimo_monitor::sync::Monitor;
///
/// let monitor = Monitor::builder()
///     .with_name("counter")
///     .with_condition("changed")
///     .build(0usize);
///
/// let value = monitor
///     .run_exclusive(|count| {
///         **count += 1;
///         monitor.condition("changed")?.broadcast();
///         Ok(**count)
///     })
///     .unwrap();
/// assert_eq!(value, 1);
/// ```
pub struct Monitor<T: ?Sized> {
    name: Cow<'static, str>,
    lock: MonitorLock,
    conditions: FxHashMap<Cow<'static, str>, MonitorCondition>,
    data: UnsafeCell<T>,
}

impl<T> Monitor<T> {
    /// Creates a new monitor without conditions.
    #[inline]
    pub fn new(value: T) -> Self {
        Builder::new().build(value)
    }

    /// Consumes the monitor, returning the protected value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl Monitor<()> {
    /// Returns a builder for configuring a new monitor.
    #[inline]
    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<T: ?Sized> Monitor<T> {
    /// Diagnostic name of the monitor.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lock of the monitor.
    #[inline]
    pub fn raw_lock(&self) -> &MonitorLock {
        &self.lock
    }

    /// Looks up the condition registered under `name`.
    pub fn condition(&self, name: &str) -> Result<&MonitorCondition> {
        self.conditions.get(name).ok_or_else(|| {
            Error::invalid(format!(
                "monitor `{}` has no condition `{}`",
                self.name, name
            ))
        })
    }

    /// Locks the monitor, blocking until the lock is handed to the caller.
    #[inline]
    pub fn lock(&self) -> Result<MonitorGuard<'_, T>> {
        self.lock_deadline(None)
    }

    /// Locks the monitor, failing with [`Error::Timeout`] after `timeout`.
    #[inline]
    pub fn lock_timeout(&self, timeout: Duration) -> Result<MonitorGuard<'_, T>> {
        self.lock_deadline(deadline(Some(timeout)))
    }

    /// Locks the monitor before an optional `deadline`.
    pub fn lock_deadline(&self, deadline: Option<Instant>) -> Result<MonitorGuard<'_, T>> {
        let token = self.lock.acquire_until(deadline)?;
        Ok(MonitorGuard::new(self, token))
    }

    /// Attempts to lock the monitor without blocking.
    #[inline]
    pub fn try_lock(&self) -> Option<MonitorGuard<'_, T>> {
        self.lock
            .try_acquire()
            .map(|token| MonitorGuard::new(self, token))
    }

    /// Runs `body` with exclusive access to the protected value.
    ///
    /// The lock is released on every exit path of `body`: normal return,
    /// error and panic. If `body` timed out on one of the conditions the lock
    /// is already gone and nothing is released.
    #[inline]
    pub fn run_exclusive<R, F>(&self, body: F) -> Result<R>
    where
        F: FnOnce(&mut MonitorGuard<'_, T>) -> Result<R>,
    {
        self.run_exclusive_deadline(None, body)
    }

    /// Like [`run_exclusive`](Self::run_exclusive), but gives up on the lock
    /// at `deadline`.
    pub fn run_exclusive_deadline<R, F>(&self, deadline: Option<Instant>, body: F) -> Result<R>
    where
        F: FnOnce(&mut MonitorGuard<'_, T>) -> Result<R>,
    {
        let mut guard = self.lock_deadline(deadline)?;
        body(&mut guard)
    }

    /// Returns a mutable reference to the protected value.
    ///
    /// The mutable borrow statically guarantees that the monitor is not
    /// locked.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

// SAFETY: The protected value is only reachable through a guard, and guards
// are only created while the lock is held.
unsafe impl<T: ?Sized + Send> Send for Monitor<T> {}
// SAFETY: See above, the lock serializes all access to the value.
unsafe impl<T: ?Sized + Send> Sync for Monitor<T> {}

static_assertions::assert_impl_all!(Monitor<Vec<u8>>: Send, Sync);
static_assertions::assert_not_impl_any!(MonitorGuard<'static, u8>: Send);

impl<T: ?Sized + Debug> Debug for Monitor<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("Monitor");
        d.field("name", &self.name);

        match self.try_lock() {
            Some(guard) => {
                d.field("data", &&*guard);
            }
            None => {
                struct LockedPlaceholder;
                impl Debug for LockedPlaceholder {
                    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                        f.write_str("<locked>")
                    }
                }
                d.field("data", &LockedPlaceholder);
            }
        }

        d.finish_non_exhaustive()
    }
}

impl<T: Default> Default for Monitor<T> {
    #[inline]
    fn default() -> Self {
        Self::new(Default::default())
    }
}

/// Configuration of a [`Monitor`].
#[derive(Debug, Default, Clone)]
pub struct Builder {
    name: Option<Cow<'static, str>>,
    conditions: Vec<Cow<'static, str>>,
}

impl Builder {
    /// Creates a new builder.
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the diagnostic name of the monitor.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Registers a condition. Registering a name twice has no effect.
    #[inline]
    pub fn with_condition(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.conditions.push(name.into());
        self
    }

    /// Builds the monitor around `value`.
    pub fn build<T>(self, value: T) -> Monitor<T> {
        let lock = MonitorLock::new();
        let conditions = self
            .conditions
            .into_iter()
            .map(|name| {
                let condition = MonitorCondition::new(name.clone(), &lock);
                (name, condition)
            })
            .collect();

        Monitor {
            name: self.name.unwrap_or(Cow::Borrowed("monitor")),
            lock,
            conditions,
            data: UnsafeCell::new(value),
        }
    }
}

/// An RAII implementation of a critical section of a [`Monitor`].
///
/// The protected value is reachable through the [`Deref`] and [`DerefMut`]
/// implementations. Dropping the guard releases the lock.
///
/// A guard becomes *disarmed* when a timed wait on one of the monitor's
/// conditions expires: the lock has been given up and was not re-acquired.
/// Dereferencing a disarmed guard panics.
#[must_use = "if unused the Monitor will immediately unlock"]
pub struct MonitorGuard<'a, T: ?Sized> {
    monitor: &'a Monitor<T>,
    token: Option<ReleaseToken>,
    // Ownership is tracked per task, the guard must stay on its task.
    _not_send: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> MonitorGuard<'a, T> {
    #[inline]
    fn new(monitor: &'a Monitor<T>, token: ReleaseToken) -> Self {
        Self {
            monitor,
            token: Some(token),
            _not_send: PhantomData,
        }
    }

    /// The monitor the guard belongs to.
    #[inline]
    pub fn monitor(&self) -> &'a Monitor<T> {
        self.monitor
    }

    /// Checks whether the guard still holds the lock.
    #[inline]
    pub fn is_held(&self) -> bool {
        self.token.is_some()
    }

    /// Releases the lock, reporting failures instead of logging them.
    pub fn unlock(mut self) -> Result<()> {
        match self.token.take() {
            Some(token) => self.monitor.lock.release(token),
            None => Ok(()),
        }
    }

    #[inline]
    pub(crate) fn token_mut(&mut self) -> Option<&mut ReleaseToken> {
        self.token.as_mut()
    }

    #[inline]
    pub(crate) fn disarm(&mut self) {
        self.token = None;
    }

    #[inline]
    fn assert_held(&self) {
        assert!(
            self.token.is_some(),
            "accessed monitor `{}` after its lock was lost to a timed out wait",
            self.monitor.name
        );
    }
}

// SAFETY: Shared access to the guard only hands out shared references to `T`.
unsafe impl<T: ?Sized + Sync> Sync for MonitorGuard<'_, T> {}

impl<T: ?Sized> Deref for MonitorGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.assert_held();
        // SAFETY: We hold the lock, so we are the sole owners of the data.
        unsafe { &*self.monitor.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MonitorGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.assert_held();
        // SAFETY: We hold the lock, so we are the sole owners of the data.
        unsafe { &mut *self.monitor.data.get() }
    }
}

impl<T: ?Sized + Debug> Debug for MonitorGuard<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_held() {
            Debug::fmt(&**self, f)
        } else {
            f.write_str("<released>")
        }
    }
}

impl<T: ?Sized + Display> Display for MonitorGuard<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&**self, f)
    }
}

impl<T: ?Sized> Drop for MonitorGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = self.monitor.lock.release(token) {
                error!("Unable to release monitor `{}`: {}", self.monitor.name, e);
            }
        }
    }
}
