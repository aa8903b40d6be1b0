// SPDX-License-Identifier: Apache-2.0 OR MIT
// Single storage cell gated by a turn sequencer

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::time::Instant;

use crate::sync::{SpinCutoff, TryWaitResult, TurnSequencer, WaitStrategy};

/// One reusable element cell.
///
/// Cycle `n` of the cell uses sequencer turns `2n` (enqueue) and `2n + 1`
/// (dequeue), so pushes and pops on a cell strictly alternate and the owner
/// of the current turn has exclusive access to `contents`.
pub(crate) struct Slot<T> {
    sequencer: TurnSequencer,
    contents: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: Slot is Sync because:
// - `contents` is only touched by the thread owning the current turn
// - turn ownership is handed over through the sequencer's acquire/release CAS
unsafe impl<T: Send> Sync for Slot<T> {}
unsafe impl<T: Send> Send for Slot<T> {}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            sequencer: TurnSequencer::new(0),
            contents: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

impl<T> Slot<T> {
    #[inline]
    const fn enqueue_turn(turn: u32) -> u32 {
        turn.wrapping_mul(2)
    }

    #[inline]
    const fn dequeue_turn(turn: u32) -> u32 {
        turn.wrapping_mul(2).wrapping_add(1)
    }

    /// Wait for cycle `turn` to become writable, store `value`, open the read.
    pub(crate) fn enqueue<W: WaitStrategy>(
        &self,
        turn: u32,
        strategy: &W,
        cutoff: &SpinCutoff,
        sample_cutoff: bool,
        value: T,
    ) {
        let seq_turn = Self::enqueue_turn(turn);
        self.sequencer
            .wait_for_turn(seq_turn, strategy, cutoff, sample_cutoff);
        // SAFETY: we own the enqueue turn; the previous occupant was moved
        // out by the dequeue turn that completed before it.
        unsafe {
            (*self.contents.get()).write(value);
        }
        self.sequencer.complete_turn(seq_turn, strategy);
    }

    /// Wait for cycle `turn` to become readable, move the value out, open the
    /// next write.
    pub(crate) fn dequeue<W: WaitStrategy>(
        &self,
        turn: u32,
        strategy: &W,
        cutoff: &SpinCutoff,
        sample_cutoff: bool,
    ) -> T {
        let seq_turn = Self::dequeue_turn(turn);
        self.sequencer
            .wait_for_turn(seq_turn, strategy, cutoff, sample_cutoff);
        // SAFETY: the enqueue turn of this cycle initialized `contents` and we
        // now own the dequeue turn, so the value is live and ours to take.
        let value = unsafe { (*self.contents.get()).assume_init_read() };
        self.sequencer.complete_turn(seq_turn, strategy);
        value
    }

    #[inline]
    pub(crate) fn may_enqueue(&self, turn: u32) -> bool {
        self.sequencer.is_turn(Self::enqueue_turn(turn))
    }

    #[inline]
    pub(crate) fn may_dequeue(&self, turn: u32) -> bool {
        self.sequencer.is_turn(Self::dequeue_turn(turn))
    }

    /// Wait, without claiming anything, until cycle `turn` may be written.
    pub(crate) fn try_wait_for_enqueue_turn_until<W: WaitStrategy>(
        &self,
        turn: u32,
        strategy: &W,
        cutoff: &SpinCutoff,
        sample_cutoff: bool,
        deadline: Instant,
    ) -> TryWaitResult {
        self.sequencer.try_wait_for_turn(
            Self::enqueue_turn(turn),
            strategy,
            cutoff,
            sample_cutoff,
            Some(deadline),
        )
    }

    /// Wait, without claiming anything, until cycle `turn` may be read.
    pub(crate) fn try_wait_for_dequeue_turn_until<W: WaitStrategy>(
        &self,
        turn: u32,
        strategy: &W,
        cutoff: &SpinCutoff,
        sample_cutoff: bool,
        deadline: Instant,
    ) -> TryWaitResult {
        self.sequencer.try_wait_for_turn(
            Self::dequeue_turn(turn),
            strategy,
            cutoff,
            sample_cutoff,
            Some(deadline),
        )
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        // An odd uncompleted turn means the enqueue of this cycle completed
        // and its dequeue did not: the cell is occupied.
        if self.sequencer.uncompleted_turn_lsb() & 1 == 1 {
            // SAFETY: occupied per the parity check; `&mut self` rules out
            // concurrent access.
            unsafe { self.contents.get_mut().assume_init_drop() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::FutexWait;
    use std::rc::Rc;

    #[test]
    fn test_enqueue_then_dequeue_alternates_turns() {
        let cutoff = SpinCutoff::new();
        let slot = Slot::default();

        assert!(slot.may_enqueue(0));
        assert!(!slot.may_dequeue(0));

        slot.enqueue(0, &FutexWait, &cutoff, false, 41u32);
        assert!(!slot.may_enqueue(0));
        assert!(slot.may_dequeue(0));

        assert_eq!(slot.dequeue(0, &FutexWait, &cutoff, false), 41);
        assert!(slot.may_enqueue(1));
    }

    #[test]
    fn test_drop_releases_occupied_value() {
        let cutoff = SpinCutoff::new();
        let tracker = Rc::new(());

        {
            let slot = Slot::default();
            slot.enqueue(0, &FutexWait, &cutoff, false, Rc::clone(&tracker));
            assert_eq!(Rc::strong_count(&tracker), 2);
        }
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_drop_skips_empty_cell() {
        let cutoff = SpinCutoff::new();
        let tracker = Rc::new(());

        let slot = Slot::default();
        slot.enqueue(0, &FutexWait, &cutoff, false, Rc::clone(&tracker));
        let taken = slot.dequeue(0, &FutexWait, &cutoff, false);
        drop(slot);

        assert_eq!(Rc::strong_count(&tracker), 2);
        drop(taken);
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_timed_wait_on_future_cycle_times_out() {
        let cutoff = SpinCutoff::new();
        let slot: Slot<u8> = Slot::default();
        let deadline = Instant::now() + std::time::Duration::from_millis(5);
        assert_eq!(
            slot.try_wait_for_dequeue_turn_until(0, &FutexWait, &cutoff, false, deadline),
            TryWaitResult::TimedOut
        );
    }
}
