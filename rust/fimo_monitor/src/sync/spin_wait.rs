// Based on the implementation in the parking_lot crate.
// Copyright 2016 Amanieu d'Antras
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

const SPIN_LIMIT: u32 = 6;
const YIELD_LIMIT: u32 = 3;

/// Bounded exponential backoff used before a waiter blocks its thread.
#[derive(Debug, Default)]
pub(crate) struct SpinWait {
    step: u32,
}

impl SpinWait {
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// Backs off once.
    ///
    /// Busy-spins for `2^step` iterations at first and yields the thread once
    /// that stops paying off. Returns `false` once the budget is exhausted, at
    /// which point the caller should block instead.
    #[inline]
    pub fn spin(&mut self) -> bool {
        if self.step >= SPIN_LIMIT + YIELD_LIMIT {
            return false;
        }

        self.step += 1;
        if self.step <= SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                std::hint::spin_loop();
            }
        } else {
            std::thread::yield_now();
        }

        true
    }
}
