//! Error types of the monitor primitives.

use crate::runtime::TaskId;
use thiserror::Error;

/// Errors reported by the monitor and the structures built on top of it.
///
/// All errors are reported synchronously to the caller of the failing
/// operation and are never retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The operation violated the ownership rules of a lock.
    #[error(transparent)]
    IllegalState(#[from] IllegalState),

    /// The deadline of a blocking operation passed before it could complete.
    ///
    /// The protected state is left as it was before the call, but the caller
    /// no longer holds the lock of the monitor.
    #[error("operation timed out")]
    Timeout,

    /// An argument was out of range, e.g. a zero amount or permit count.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A withdrawal requested more than the available balance.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Requested amount.
        requested: u64,
        /// Balance at the time of the request.
        available: u64,
    },
}

/// Ownership violations of a [`MonitorLock`](crate::sync::MonitorLock).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IllegalState {
    /// The lock, or the shared resource, is not held.
    #[error("lock is not held")]
    NotHeld,

    /// The lock is held by a different task.
    #[error("lock is held by {owner}, not by {caller}")]
    NotOwner {
        /// Current owner of the lock.
        owner: TaskId,
        /// Task that attempted the operation.
        caller: TaskId,
    },

    /// The task tried to acquire a lock it already holds.
    #[error("{0} re-entered a monitor it already holds")]
    Reentrant(TaskId),

    /// The release token belongs to an earlier acquisition of the lock.
    #[error("release token was issued for an earlier acquisition")]
    StaleToken,

    /// A condition or release token was used with a lock it is not bound to.
    #[error("`{0}` is bound to a different lock")]
    ForeignLock(String),
}

/// Result type of the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Returns whether the error is a [`Error::Timeout`].
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}
