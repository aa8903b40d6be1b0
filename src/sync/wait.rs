// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Spin-then-block wait strategies
//!
//! A turn wait first spins on the sequencer word for a learned number of
//! clock ticks, then parks in the kernel. The pieces that touch hardware
//! (the tick source and the park/unpark calls) sit behind [`WaitStrategy`] so
//! sequencer logic can be driven by a fake clock and a recording parker in
//! tests.
//!
//! ## Spin cutoff
//!
//! [`SpinCutoff`] holds the learned spin budget. It is shared by every slot of
//! a queue (one for producers, one for consumers) and adapts as waits complete:
//! - a wait satisfied while spinning pulls the cutoff toward twice the
//!   measured spin time (1/8 moving average)
//! - a wait that had to park resets the target to [`MIN_SPIN_TICKS`]

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use super::futex::{futex_wait, futex_wake, FutexResult};

/// Floor for the adaptive spin budget, in ticks.
pub const MIN_SPIN_TICKS: u32 = 200;
/// Ceiling for the adaptive spin budget, in ticks. Sampled waits spin this long.
pub const MAX_SPIN_TICKS: u32 = 20_000;
/// Every this-many tickets a wait re-measures the spin budget.
pub const ADAPTATION_FREQ: u64 = 128;

// ============================================================================
// Core Trait
// ============================================================================

/// Tick source plus park/unpark primitive used by turn waits.
pub trait WaitStrategy: Send + Sync {
    /// Monotonic tick counter used to bound spinning.
    fn ticks(&self) -> u64;

    /// Called once per spin iteration.
    fn relax(&self) {
        std::hint::spin_loop();
    }

    /// Park while `*word == expected`. See [`futex_wait`].
    fn park(
        &self,
        word: &AtomicU32,
        expected: u32,
        deadline: Option<Instant>,
        channel: u32,
    ) -> FutexResult;

    /// Wake every thread parked on `word` for `channel`.
    fn unpark(&self, word: &AtomicU32, channel: u32) -> usize;
}

// ============================================================================
// Kernel-backed strategy
// ============================================================================

/// Spins on the CPU cycle counter, parks on a futex.
#[derive(Debug, Clone, Copy, Default)]
pub struct FutexWait;

impl WaitStrategy for FutexWait {
    #[inline]
    fn ticks(&self) -> u64 {
        cycle_counter()
    }

    fn park(
        &self,
        word: &AtomicU32,
        expected: u32,
        deadline: Option<Instant>,
        channel: u32,
    ) -> FutexResult {
        futex_wait(word, expected, deadline, channel)
    }

    fn unpark(&self, word: &AtomicU32, channel: u32) -> usize {
        futex_wake(word, u32::MAX, channel)
    }
}

/// Time stamp counter on x86_64, monotonic nanoseconds elsewhere.
#[inline]
pub fn cycle_counter() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: RDTSC has no preconditions on x86_64.
        unsafe { core::arch::x86_64::_rdtsc() }
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        static ANCHOR: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        ANCHOR.get_or_init(Instant::now).elapsed().as_nanos() as u64
    }
}

// ============================================================================
// Spin cutoff
// ============================================================================

/// Learned spin budget, in ticks. Zero means "not yet measured".
#[derive(Debug, Default)]
pub struct SpinCutoff(AtomicU32);

impl SpinCutoff {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Current budget in ticks (0 until the first wait completes).
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Budget a wait should spin for before parking.
    pub(crate) fn effective(&self, sample: bool) -> (u32, u32) {
        let prev = self.get();
        let budget = if sample || prev == 0 {
            MAX_SPIN_TICKS
        } else {
            prev
        };
        (prev, budget)
    }

    /// Fold the outcome of one wait into the budget.
    ///
    /// `prev` is the value observed when the wait started; a lost race on the
    /// update just drops this sample.
    pub(crate) fn record(&self, prev: u32, spun_ticks: u64, parked: bool) {
        let target = if parked {
            MIN_SPIN_TICKS
        } else {
            spun_ticks
                .saturating_mul(2)
                .clamp(MIN_SPIN_TICKS as u64, MAX_SPIN_TICKS as u64) as u32
        };

        if prev == 0 {
            self.0.store(target, Ordering::Relaxed);
        } else {
            let delta = (target as i64 - prev as i64) / 8;
            let next = (prev as i64 + delta) as u32;
            let _ = self
                .0
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed);
        }
    }
}
