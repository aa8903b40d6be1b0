// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Ticket-based bounded MPMC queue
//!
//! Producers and consumers each claim a ticket from their own counter. A
//! ticket names a slot (`ticket * stride mod capacity`) and a cycle of that
//! slot (`ticket / capacity`); the slot's turn sequencer then orders the
//! claimants, so the only shared write in the hot path is the ticket CAS.
//!
//! Four flavours of each operation:
//! - blocking (`push` / `pop`): claim unconditionally, wait for the slot
//! - ready (`try_push` / `try_pop`): claim only if the slot is already at
//!   the right turn, never wait
//! - promised (`write_if_not_full` / `read_if_not_empty`): claim only if the
//!   counters say there is room / an element, then wait briefly for the slot
//! - timed (`try_push_until` / `try_pop_until`): promised, retried until a
//!   deadline

use std::fmt;
use std::mem::size_of;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::slot::Slot;
use super::CacheAligned;
use crate::error::{Error, Result};
use crate::sync::turn_sequencer::claim_ticket;
use crate::sync::wait::ADAPTATION_FREQ;
use crate::sync::{FutexWait, SpinCutoff, TryWaitResult, WaitStrategy};

const CACHE_LINE: usize = 64;

const SMALL_PRIMES: [usize; 9] = [2, 3, 5, 7, 11, 13, 17, 19, 23];

pub struct MpmcQueue<T, W: WaitStrategy = FutexWait> {
    capacity: usize,
    stride: usize,
    slot_padding: usize,
    /// `capacity` live slots with `slot_padding` spare slots on each end.
    slots: Box<[Slot<T>]>,
    push_ticket: CacheAligned<AtomicU64>,
    pop_ticket: CacheAligned<AtomicU64>,
    push_spin_cutoff: CacheAligned<SpinCutoff>,
    pop_spin_cutoff: CacheAligned<SpinCutoff>,
    strategy: W,
}

impl<T> MpmcQueue<T> {
    /// Create a queue holding at most `capacity` elements.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_strategy(capacity, FutexWait)
    }
}

impl<T, W: WaitStrategy> MpmcQueue<T, W> {
    pub fn with_strategy(capacity: usize, strategy: W) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }

        let slot_padding = (CACHE_LINE - 1) / size_of::<Slot<T>>() + 1;
        let slots = (0..capacity + 2 * slot_padding)
            .map(|_| Slot::default())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            capacity,
            stride: compute_stride(capacity),
            slot_padding,
            slots,
            push_ticket: CacheAligned(AtomicU64::new(0)),
            pop_ticket: CacheAligned(AtomicU64::new(0)),
            push_spin_cutoff: CacheAligned(SpinCutoff::new()),
            pop_spin_cutoff: CacheAligned(SpinCutoff::new()),
            strategy,
        })
    }

    // ========================================================================
    // Blocking
    // ========================================================================

    /// Enqueue `value`, blocking while the queue is full.
    pub fn push(&self, value: T) {
        let ticket = claim_ticket(&self.push_ticket);
        self.enqueue_with_ticket(ticket, value);
    }

    /// Dequeue the oldest element, blocking while the queue is empty.
    pub fn pop(&self) -> T {
        self.pop_with_ticket().1
    }

    /// Like [`pop`](Self::pop), also returning the dequeue ticket.
    pub fn pop_with_ticket(&self) -> (u64, T) {
        let ticket = claim_ticket(&self.pop_ticket);
        (ticket, self.dequeue_with_ticket(ticket))
    }

    // ========================================================================
    // Ready: succeed only without waiting
    // ========================================================================

    /// Enqueue if the next slot is free right now; hands `value` back otherwise.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        match self.claim_ready_push_ticket() {
            Some(ticket) => {
                self.enqueue_with_ticket(ticket, value);
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Dequeue if the next slot holds an element right now.
    pub fn try_pop(&self) -> Option<T> {
        self.claim_ready_pop_ticket()
            .map(|ticket| self.dequeue_with_ticket(ticket))
    }

    // ========================================================================
    // Promised: claim only if the counters show room / an element
    // ========================================================================

    /// Enqueue unless the queue is full. May wait briefly for a consumer that
    /// has claimed, but not yet vacated, the target slot.
    pub fn write_if_not_full(&self, value: T) -> Result<(), T> {
        match self.claim_promised_push_ticket() {
            Ok(ticket) => {
                self.enqueue_with_ticket(ticket, value);
                Ok(())
            }
            Err(_) => Err(value),
        }
    }

    /// Dequeue unless the queue is empty. May wait briefly for a producer that
    /// has claimed, but not yet filled, the target slot.
    pub fn read_if_not_empty(&self) -> Option<T> {
        self.claim_promised_pop_ticket()
            .ok()
            .map(|ticket| self.dequeue_with_ticket(ticket))
    }

    // ========================================================================
    // Timed
    // ========================================================================

    /// Enqueue, waiting for room until `deadline`. Hands `value` back on timeout.
    pub fn try_push_until(&self, value: T, deadline: Instant) -> Result<(), T> {
        loop {
            let ticket = match self.claim_promised_push_ticket() {
                Ok(ticket) => {
                    self.enqueue_with_ticket(ticket, value);
                    return Ok(());
                }
                Err(observed) => observed,
            };

            let (slot, turn) = self.locate(ticket);
            match slot.try_wait_for_enqueue_turn_until(
                turn,
                &self.strategy,
                &self.push_spin_cutoff,
                ticket % ADAPTATION_FREQ == 0,
                deadline,
            ) {
                TryWaitResult::TimedOut => return Err(value),
                // Past: another producer already took that ticket.
                TryWaitResult::Success | TryWaitResult::Past => {}
            }
        }
    }

    /// Dequeue, waiting for an element until `deadline`.
    pub fn try_pop_until(&self, deadline: Instant) -> Option<T> {
        loop {
            let ticket = match self.claim_promised_pop_ticket() {
                Ok(ticket) => return Some(self.dequeue_with_ticket(ticket)),
                Err(observed) => observed,
            };

            let (slot, turn) = self.locate(ticket);
            match slot.try_wait_for_dequeue_turn_until(
                turn,
                &self.strategy,
                &self.pop_spin_cutoff,
                ticket % ADAPTATION_FREQ == 0,
                deadline,
            ) {
                TryWaitResult::TimedOut => return None,
                TryWaitResult::Success | TryWaitResult::Past => {}
            }
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Completed-or-claimed pushes minus pops, clamped to `[0, capacity]`.
    ///
    /// Consumers blocked on an empty queue count as negative occupancy
    /// internally; that is reported as 0.
    pub fn size(&self) -> usize {
        let mut pushes = self.push_ticket.load(Ordering::Acquire);
        loop {
            let pops = self.pop_ticket.load(Ordering::Acquire);
            let next_pushes = self.push_ticket.load(Ordering::Acquire);
            if pushes == next_pushes {
                let n = pushes.wrapping_sub(pops) as i64;
                return n.clamp(0, self.capacity as i64) as usize;
            }
            pushes = next_pushes;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Number of push tickets handed out so far.
    pub fn write_count(&self) -> u64 {
        self.push_ticket.load(Ordering::Acquire)
    }

    /// Number of pop tickets handed out so far.
    pub fn read_count(&self) -> u64 {
        self.pop_ticket.load(Ordering::Acquire)
    }

    pub(crate) fn stride(&self) -> usize {
        self.stride
    }

    // ========================================================================
    // Internals
    // ========================================================================

    #[inline]
    fn locate(&self, ticket: u64) -> (&Slot<T>, u32) {
        let cap = self.capacity as u64;
        let index = (ticket.wrapping_mul(self.stride as u64) % cap) as usize + self.slot_padding;
        (&self.slots[index], (ticket / cap) as u32)
    }

    fn enqueue_with_ticket(&self, ticket: u64, value: T) {
        let (slot, turn) = self.locate(ticket);
        slot.enqueue(
            turn,
            &self.strategy,
            &self.push_spin_cutoff,
            ticket % ADAPTATION_FREQ == 0,
            value,
        );
    }

    fn dequeue_with_ticket(&self, ticket: u64) -> T {
        let (slot, turn) = self.locate(ticket);
        slot.dequeue(
            turn,
            &self.strategy,
            &self.pop_spin_cutoff,
            ticket % ADAPTATION_FREQ == 0,
        )
    }

    fn claim_ready_push_ticket(&self) -> Option<u64> {
        let mut ticket = self.push_ticket.load(Ordering::Acquire);
        loop {
            let (slot, turn) = self.locate(ticket);
            if !slot.may_enqueue(turn) {
                let prev = ticket;
                ticket = self.push_ticket.load(Ordering::Acquire);
                if prev == ticket {
                    return None;
                }
                continue;
            }
            match self.push_ticket.compare_exchange(
                ticket,
                ticket + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(ticket),
                Err(actual) => ticket = actual,
            }
        }
    }

    fn claim_ready_pop_ticket(&self) -> Option<u64> {
        let mut ticket = self.pop_ticket.load(Ordering::Acquire);
        loop {
            let (slot, turn) = self.locate(ticket);
            if !slot.may_dequeue(turn) {
                let prev = ticket;
                ticket = self.pop_ticket.load(Ordering::Acquire);
                if prev == ticket {
                    return None;
                }
                continue;
            }
            match self.pop_ticket.compare_exchange(
                ticket,
                ticket + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(ticket),
                Err(actual) => ticket = actual,
            }
        }
    }

    /// `Err` carries the push ticket observed when the queue looked full.
    fn claim_promised_push_ticket(&self) -> Result<u64, u64> {
        let mut pushes = self.push_ticket.load(Ordering::Acquire);
        loop {
            let pops = self.pop_ticket.load(Ordering::Acquire);
            if pushes.wrapping_sub(pops) as i64 >= self.capacity as i64 {
                return Err(pushes);
            }
            match self.push_ticket.compare_exchange(
                pushes,
                pushes + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(pushes),
                Err(actual) => pushes = actual,
            }
        }
    }

    /// `Err` carries the pop ticket observed when the queue looked empty.
    fn claim_promised_pop_ticket(&self) -> Result<u64, u64> {
        let mut pops = self.pop_ticket.load(Ordering::Acquire);
        loop {
            let pushes = self.push_ticket.load(Ordering::Acquire);
            if pushes.wrapping_sub(pops) as i64 <= 0 {
                return Err(pops);
            }
            match self.pop_ticket.compare_exchange(
                pops,
                pops + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(pops),
                Err(actual) => pops = actual,
            }
        }
    }
}

impl<T, W: WaitStrategy> fmt::Debug for MpmcQueue<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpmcQueue")
            .field("capacity", &self.capacity)
            .field("stride", &self.stride)
            .field("write_count", &self.write_count())
            .field("read_count", &self.read_count())
            .finish()
    }
}

/// Pick the small prime that maps consecutive tickets furthest apart.
///
/// Primes that divide (or are multiples of) the capacity would not visit
/// every slot and are skipped; 1 is the fallback.
fn compute_stride(capacity: usize) -> usize {
    let mut best_stride = 1;
    let mut best_separation = 1;

    for &prime in SMALL_PRIMES.iter() {
        if prime % capacity == 0 || capacity % prime == 0 {
            continue;
        }
        let separation = prime % capacity;
        let separation = separation.min(capacity - separation);
        if separation > best_separation {
            best_stride = prime;
            best_separation = separation;
        }
    }
    best_stride
}
