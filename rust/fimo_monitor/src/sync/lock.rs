use crate::error::{Error, IllegalState, Result};
use crate::runtime::{deadline, TaskId, Waiter, WakeupToken};
use log::{debug, trace};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Process-unique identity of a [`MonitorLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockId(u64);

impl LockId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for LockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "lock-{}", self.0)
    }
}

/// Proof of a successful [`MonitorLock::acquire`].
///
/// The token must be passed back to [`MonitorLock::release`], which consumes
/// it. Every grant of the lock carries a new epoch, and a token is only
/// accepted while its epoch is the current one. A token that outlived its
/// acquisition, e.g. one kept across a timed out
/// [`MonitorCondition::wait_on`](super::MonitorCondition::wait_on), is
/// rejected with [`IllegalState::StaleToken`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "the lock stays held until the token is released"]
pub struct ReleaseToken {
    lock: LockId,
    owner: TaskId,
    epoch: u64,
}

impl ReleaseToken {
    /// Lock that issued the token.
    #[inline]
    pub fn lock(&self) -> LockId {
        self.lock
    }

    /// Task the token was issued to.
    #[inline]
    pub fn owner(&self) -> TaskId {
        self.owner
    }
}

/// An exclusive, non-reentrant lock with a FIFO admission queue.
///
/// Contended acquirers are queued in arrival order. On release the lock is
/// handed directly to the head of the queue, so a newly arriving task can
/// never bypass a queued one. A task that already holds the lock and tries to
/// acquire it again fails with [`IllegalState::Reentrant`] instead of
/// deadlocking.
pub struct MonitorLock {
    id: LockId,
    state: Mutex<LockState>,
}

#[derive(Debug, Default)]
struct LockState {
    // `owner == None` implies an empty queue, since releases hand off.
    owner: Option<TaskId>,
    // Bumped on every grant, including hand-offs.
    epoch: u64,
    queue: VecDeque<Arc<Waiter>>,
}

impl LockState {
    fn grant(&mut self, task: TaskId) -> u64 {
        self.owner = Some(task);
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }
}

impl MonitorLock {
    /// Creates a new lock in the unlocked state.
    pub fn new() -> Self {
        Self {
            id: LockId::next(),
            state: Mutex::new(LockState::default()),
        }
    }

    /// Identity of the lock.
    #[inline]
    pub fn id(&self) -> LockId {
        self.id
    }

    /// Acquires the lock, blocking the calling task until it is handed over.
    pub fn acquire(&self) -> Result<ReleaseToken> {
        self.acquire_until(None)
    }

    /// Acquires the lock, failing with [`Error::Timeout`] after `timeout`.
    ///
    /// A task that times out is removed from the admission queue.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<ReleaseToken> {
        self.acquire_until(deadline(Some(timeout)))
    }

    /// Acquires the lock before an optional `deadline`.
    pub fn acquire_until(&self, deadline: Option<Instant>) -> Result<ReleaseToken> {
        let caller = TaskId::current();
        let waiter = {
            let mut state = self.state.lock();
            match state.owner {
                None => {
                    let epoch = state.grant(caller);
                    trace!("{} acquired {}", caller, self.id);
                    return Ok(self.token_for(caller, epoch));
                }
                Some(owner) if owner == caller => {
                    return Err(IllegalState::Reentrant(caller).into());
                }
                Some(_) => {}
            }

            let waiter = Arc::new(Waiter::new(caller));
            state.queue.push_back(Arc::clone(&waiter));
            trace!(
                "{} queued on {} at position {}",
                caller,
                self.id,
                state.queue.len()
            );
            waiter
        };

        // The hand-off may have raced with the deadline, so the outcome is
        // decided under the state lock the hand-off is posted under.
        let handed_off = waiter.park(deadline).is_some();
        let mut state = self.state.lock();
        if handed_off || waiter.token() == Some(WakeupToken::Handoff) {
            return Ok(self.token_for(caller, state.epoch));
        }
        state.queue.retain(|w| !Arc::ptr_eq(w, &waiter));
        debug!("{} timed out waiting for {}", caller, self.id);
        Err(Error::Timeout)
    }

    /// Acquires the lock only if it is free and nobody is queued.
    pub fn try_acquire(&self) -> Option<ReleaseToken> {
        let caller = TaskId::current();
        let mut state = self.state.lock();
        if state.owner.is_some() {
            return None;
        }

        let epoch = state.grant(caller);
        trace!("{} acquired {}", caller, self.id);
        Some(self.token_for(caller, epoch))
    }

    /// Releases the lock held by the calling task.
    ///
    /// If tasks are queued, ownership passes to the oldest one, which is then
    /// resumed. Fails if the lock is not held, is held by another task, if
    /// the token was issued by a different lock or for an earlier
    /// acquisition. The token is consumed either way.
    pub fn release(&self, token: ReleaseToken) -> Result<()> {
        self.release_with(&token)
    }

    pub(crate) fn release_with(&self, token: &ReleaseToken) -> Result<()> {
        let caller = TaskId::current();
        let mut state = self.state.lock();
        self.check_token(&state, token, caller)?;

        match state.queue.pop_front() {
            Some(next) => {
                state.grant(next.task());
                trace!("{} handed {} to {}", caller, self.id, next.task());
                next.unpark(WakeupToken::Handoff);
            }
            None => {
                state.owner = None;
                trace!("{} released {}", caller, self.id);
            }
        }

        Ok(())
    }

    /// Checks that `token` proves the current acquisition by the caller.
    pub(crate) fn validate(&self, token: &ReleaseToken) -> Result<()> {
        self.check_token(&self.state.lock(), token, TaskId::current())
    }

    fn check_token(&self, state: &LockState, token: &ReleaseToken, caller: TaskId) -> Result<()> {
        if token.lock != self.id {
            return Err(IllegalState::ForeignLock("release token".into()).into());
        }

        match state.owner {
            None => Err(IllegalState::NotHeld.into()),
            Some(owner) if owner != caller => Err(IllegalState::NotOwner { owner, caller }.into()),
            Some(_) if token.epoch != state.epoch => Err(IllegalState::StaleToken.into()),
            Some(_) => Ok(()),
        }
    }

    #[inline]
    fn token_for(&self, owner: TaskId, epoch: u64) -> ReleaseToken {
        ReleaseToken {
            lock: self.id,
            owner,
            epoch,
        }
    }

    /// Checks whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Current owner of the lock.
    pub fn owner(&self) -> Option<TaskId> {
        self.state.lock().owner
    }

    /// Number of tasks queued for admission.
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl Default for MonitorLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for MonitorLock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MonitorLock")
            .field("id", &self.id)
            .field("owner", &state.owner)
            .field("queued", &state.queue.len())
            .finish()
    }
}
