use super::monitor::Monitor;
use crate::error::{Error, Result};
use crate::runtime::deadline;
use log::debug;
use std::fmt::{Debug, Formatter};
use std::time::{Duration, Instant};

const RELEASED: &str = "released";

/// A reusable barrier for a fixed number of parties.
///
/// Every cycle ("generation") blocks the first `parties - 1` callers of
/// [`wait`](Self::wait) and releases all of them together once the last party
/// arrives. A party arriving in generation `g` is only released by the
/// completion of generation `g`, so a fast task that already entered the next
/// cycle can not be released early.
pub struct CyclicBarrier {
    parties: usize,
    monitor: Monitor<BarrierState>,
}

#[derive(Debug)]
struct BarrierState {
    waiting: usize,
    generation: u64,
}

/// Result of a [`CyclicBarrier::wait`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    leader: bool,
    generation: u64,
}

impl BarrierWaitResult {
    /// Returns true if this task tripped the barrier.
    ///
    /// Exactly one task per generation is the leader.
    #[inline]
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// The generation the task was released from.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl CyclicBarrier {
    /// Creates a barrier for `parties` tasks.
    ///
    /// Fails with [`Error::InvalidArgument`] if `parties` is zero.
    pub fn new(parties: usize) -> Result<Self> {
        if parties == 0 {
            return Err(Error::invalid("barrier parties must be positive"));
        }

        let monitor = Monitor::builder()
            .with_name("cyclic_barrier")
            .with_condition(RELEASED)
            .build(BarrierState {
                waiting: 0,
                generation: 0,
            });

        Ok(Self { parties, monitor })
    }

    /// Blocks until all parties of the current generation have arrived.
    #[inline]
    pub fn wait(&self) -> Result<BarrierWaitResult> {
        self.wait_deadline(None)
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`.
    ///
    /// A task that times out withdraws its arrival, so the remaining parties
    /// still need `parties` arrivals to trip the barrier.
    #[inline]
    pub fn wait_timeout(&self, timeout: Duration) -> Result<BarrierWaitResult> {
        self.wait_deadline(deadline(Some(timeout)))
    }

    /// Blocks until the generation completes or `deadline` passes.
    pub fn wait_deadline(&self, deadline: Option<Instant>) -> Result<BarrierWaitResult> {
        let mut arrived_in = None;
        let res = self.monitor.run_exclusive_deadline(deadline, |state| {
            state.waiting += 1;
            let generation = state.generation;

            if state.waiting == self.parties {
                state.waiting = 0;
                state.generation = generation.wrapping_add(1);
                self.monitor.condition(RELEASED)?.broadcast();
                return Ok(BarrierWaitResult {
                    leader: true,
                    generation,
                });
            }

            arrived_in = Some(generation);
            self.monitor
                .condition(RELEASED)?
                .wait_while(state, deadline, |state| state.generation == generation)?;
            Ok(BarrierWaitResult {
                leader: false,
                generation,
            })
        });

        match (res, arrived_in) {
            (Err(Error::Timeout), Some(generation)) => self.withdraw(generation),
            (res, _) => res,
        }
    }

    // The lock was lost with the timeout, so the arrival is undone in a
    // separate critical section.
    fn withdraw(&self, generation: u64) -> Result<BarrierWaitResult> {
        self.monitor.run_exclusive(|state| {
            if state.generation != generation {
                // Tripped between the timeout and now.
                return Ok(BarrierWaitResult {
                    leader: false,
                    generation,
                });
            }

            state.waiting -= 1;
            debug!(
                "Barrier arrival withdrawn after timeout in generation {}",
                generation
            );
            Err(Error::Timeout)
        })
    }

    /// Number of parties needed to trip the barrier.
    #[inline]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Number of parties currently waiting.
    pub fn waiting_count(&self) -> Result<usize> {
        self.monitor.run_exclusive(|state| Ok(state.waiting))
    }

    /// Number of completed generations.
    pub fn generation(&self) -> Result<u64> {
        self.monitor.run_exclusive(|state| Ok(state.generation))
    }
}

impl Debug for CyclicBarrier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CyclicBarrier")
            .field("parties", &self.parties)
            .field("monitor", &self.monitor)
            .finish()
    }
}
