// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Turn sequencer
//!
//! A single 32-bit word that hands out strictly ordered turns. Each caller
//! owns exactly one turn (derived from a ticket), waits until the sequencer
//! reaches it, does its work, then completes it, which opens turn + 1.
//!
//! State layout:
//!
//! ```text
//!  31                              6 5        0
//! +---------------------------------+----------+
//! |  current turn (low 26 bits)     | waiters  |
//! +---------------------------------+----------+
//! ```
//!
//! `waiters` is the largest distance (in turns, saturating at 63) between the
//! current turn and any parked waiter. Completing a turn shrinks it by one and
//! only issues a futex wake when it was non-zero, so an uncontended
//! hand-off never enters the kernel.
//!
//! Parked waiters use channel `1 << (turn & 31)`, so a completion wakes only
//! the threads waiting for the very next turn (plus any alias 32 turns away,
//! which simply re-check and park again).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use super::futex::FutexResult;
use super::wait::{SpinCutoff, WaitStrategy};

const TURN_SHIFT: u32 = 6;
const WAITERS_MASK: u32 = (1 << TURN_SHIFT) - 1;

/// Outcome of [`TurnSequencer::try_wait_for_turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryWaitResult {
    /// The requested turn is now current.
    Success,
    /// The requested turn is more than half the counter range behind the
    /// current one; the caller is holding a stale ticket.
    Past,
    /// The deadline elapsed before the turn arrived.
    TimedOut,
}

#[derive(Debug)]
pub struct TurnSequencer {
    state: AtomicU32,
}

impl Default for TurnSequencer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TurnSequencer {
    pub const fn new(first_turn: u32) -> Self {
        Self {
            state: AtomicU32::new(encode(first_turn << TURN_SHIFT, 0)),
        }
    }

    /// True if `turn` is the current turn.
    #[inline]
    pub fn is_turn(&self, turn: u32) -> bool {
        let state = self.state.load(Ordering::Acquire);
        decode_current_sturn(state) == turn << TURN_SHIFT
    }

    /// Block until `turn` is current.
    ///
    /// # Panics
    /// Panics if `turn` is already past; that means the caller held its ticket
    /// across a full wraparound of the turn counter, which breaks slot
    /// exclusivity and cannot be recovered from.
    pub fn wait_for_turn<W: WaitStrategy>(
        &self,
        turn: u32,
        strategy: &W,
        cutoff: &SpinCutoff,
        sample_cutoff: bool,
    ) {
        match self.try_wait_for_turn(turn, strategy, cutoff, sample_cutoff, None) {
            TryWaitResult::Success => {}
            TryWaitResult::Past => panic!(
                "turn {} is already past (current turn {}): ticket was held across a turn counter wraparound",
                turn,
                self.current_turn()
            ),
            TryWaitResult::TimedOut => unreachable!("untimed turn wait reported a timeout"),
        }
    }

    /// Wait for `turn`, spinning up to the learned cutoff before parking.
    ///
    /// With `sample_cutoff` set (or before the first measurement) the wait
    /// spins for the full budget and feeds its timing back into `cutoff`.
    /// A timed-out wait leaves no trace beyond a possibly raised waiter count,
    /// which only costs a spare wake later.
    pub fn try_wait_for_turn<W: WaitStrategy>(
        &self,
        turn: u32,
        strategy: &W,
        cutoff: &SpinCutoff,
        sample_cutoff: bool,
        deadline: Option<Instant>,
    ) -> TryWaitResult {
        let (prev_cutoff, budget) = cutoff.effective(sample_cutoff);
        let sturn = turn << TURN_SHIFT;

        let mut begin = 0u64;
        let mut tries = 0u32;
        let mut parked = false;

        loop {
            let state = self.state.load(Ordering::Acquire);
            let current_sturn = decode_current_sturn(state);
            if current_sturn == sturn {
                break;
            }

            if sturn.wrapping_sub(current_sturn) >= u32::MAX / 2 {
                return TryWaitResult::Past;
            }

            let now = strategy.ticks();
            if tries == 0 {
                begin = now;
            }
            tries = tries.saturating_add(1);
            if tries == 1 || now < begin.saturating_add(budget as u64) {
                strategy.relax();
                continue;
            }

            // Spin budget exhausted: advertise ourselves and park.
            let current_max_delta = decode_max_waiters_delta(state);
            let our_delta = sturn.wrapping_sub(current_sturn) >> TURN_SHIFT;
            let expected = if our_delta <= current_max_delta {
                state
            } else {
                let new_state = encode(current_sturn, our_delta);
                if state != new_state
                    && self
                        .state
                        .compare_exchange(state, new_state, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                {
                    continue;
                }
                new_state
            };

            parked = true;
            if let FutexResult::TimedOut =
                strategy.park(&self.state, expected, deadline, futex_channel(turn))
            {
                return TryWaitResult::TimedOut;
            }
            // Awoken, value changed or interrupted: re-check from the top.
        }

        if sample_cutoff || prev_cutoff == 0 {
            let spun = if tries == 0 {
                0
            } else {
                strategy.ticks().saturating_sub(begin)
            };
            cutoff.record(prev_cutoff, spun, parked);
        }

        TryWaitResult::Success
    }

    /// Finish `turn`, making `turn + 1` current and waking its parked waiters.
    ///
    /// Must only be called by the owner of `turn` after its wait succeeded.
    pub fn complete_turn<W: WaitStrategy>(&self, turn: u32, strategy: &W) {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            debug_assert_eq!(
                decode_current_sturn(state),
                turn << TURN_SHIFT,
                "complete_turn({}) called while turn {} is current",
                turn,
                decode_current_sturn(state) >> TURN_SHIFT
            );
            let max_delta = decode_max_waiters_delta(state);
            let next_turn = turn.wrapping_add(1);
            let new_state = encode(next_turn << TURN_SHIFT, max_delta.saturating_sub(1));

            match self.state.compare_exchange_weak(
                state,
                new_state,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if max_delta != 0 {
                        strategy.unpark(&self.state, futex_channel(next_turn));
                    }
                    return;
                }
                Err(actual) => state = actual,
            }
        }
    }

    /// Low byte of the current (not yet completed) turn.
    ///
    /// A slot uses the parity to tell whether it holds a value.
    #[inline]
    pub fn uncompleted_turn_lsb(&self) -> u8 {
        (self.state.load(Ordering::Acquire) >> TURN_SHIFT) as u8
    }

    /// Current turn, truncated to the 26 bits the state word stores.
    pub fn current_turn(&self) -> u32 {
        decode_current_sturn(self.state.load(Ordering::Acquire)) >> TURN_SHIFT
    }
}

/// Claim the next ticket from `counter` (load, then CAS to `ticket + 1`).
#[inline]
pub(crate) fn claim_ticket(counter: &AtomicU64) -> u64 {
    let mut ticket = counter.load(Ordering::Acquire);
    loop {
        match counter.compare_exchange_weak(
            ticket,
            ticket.wrapping_add(1),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return ticket,
            Err(actual) => ticket = actual,
        }
    }
}

#[inline]
const fn futex_channel(turn: u32) -> u32 {
    1u32 << (turn & 31)
}

#[inline]
const fn decode_current_sturn(state: u32) -> u32 {
    state & !WAITERS_MASK
}

#[inline]
const fn decode_max_waiters_delta(state: u32) -> u32 {
    state & WAITERS_MASK
}

#[inline]
const fn encode(current_sturn: u32, max_waiters_delta: u32) -> u32 {
    let delta = if max_waiters_delta < WAITERS_MASK {
        max_waiters_delta
    } else {
        WAITERS_MASK
    };
    current_sturn | delta
}
