// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Futex wait/wake over a 32-bit atomic word.
//!
//! Thin wrappers around `FUTEX_WAIT_BITSET` / `FUTEX_WAKE_BITSET`. A waiter
//! and a waker only meet if their channel masks intersect, which lets many
//! logical wait queues share a single word.
//!
//! Neither call loops: spurious wakeups and `EINTR` are reported to the caller,
//! which is expected to re-check its condition and wait again.

use std::sync::atomic::AtomicU32;
use std::time::Instant;

/// Outcome of a [`futex_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutexResult {
    /// The word did not hold the expected value; the call returned immediately.
    ValueChanged,
    /// Woken by a [`futex_wake`] (or spuriously).
    Awoken,
    /// Interrupted by a signal.
    Interrupted,
    /// The deadline elapsed. Never returned when no deadline was given.
    TimedOut,
}

/// Wakes every waiter regardless of its channel.
pub const ALL_CHANNELS: u32 = u32::MAX;

/// Block while `*word == expected`, until woken on a channel in `channel_mask`
/// or until `deadline` passes.
pub fn futex_wait(
    word: &AtomicU32,
    expected: u32,
    deadline: Option<Instant>,
    channel_mask: u32,
) -> FutexResult {
    debug_assert_ne!(channel_mask, 0, "futex channel mask must be non-zero");

    let timeout = deadline.map(absolute_monotonic);
    let timeout_ptr = timeout
        .as_ref()
        .map_or(std::ptr::null(), |ts| ts as *const libc::timespec);

    // SAFETY: `word` is a live, aligned u32 for the duration of the call and
    // `timeout_ptr` is either null or points at a timespec on our stack.
    let rv = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAIT_BITSET | libc::FUTEX_PRIVATE_FLAG,
            expected,
            timeout_ptr,
            std::ptr::null::<u32>(),
            channel_mask,
        )
    };

    if rv == 0 {
        return FutexResult::Awoken;
    }

    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::ETIMEDOUT) => {
            debug_assert!(deadline.is_some());
            FutexResult::TimedOut
        }
        Some(libc::EINTR) => FutexResult::Interrupted,
        Some(libc::EAGAIN) => FutexResult::ValueChanged,
        other => {
            debug_assert!(false, "unexpected futex wait errno: {:?}", other);
            FutexResult::ValueChanged
        }
    }
}

/// Wake up to `max_count` waiters on `word` whose channel intersects
/// `channel_mask`. Returns the number of threads woken.
pub fn futex_wake(word: &AtomicU32, max_count: u32, channel_mask: u32) -> usize {
    let count = max_count.min(i32::MAX as u32) as libc::c_int;

    // SAFETY: the kernel only uses the address as a key for FUTEX_WAKE.
    let rv = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE_BITSET | libc::FUTEX_PRIVATE_FLAG,
            count,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            channel_mask,
        )
    };

    if rv < 0 {
        0
    } else {
        rv as usize
    }
}

/// FUTEX_WAIT_BITSET takes an absolute CLOCK_MONOTONIC timeout.
fn absolute_monotonic(deadline: Instant) -> libc::timespec {
    let remaining = deadline.saturating_duration_since(Instant::now());

    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `now` is a valid out-pointer; CLOCK_MONOTONIC always exists on Linux.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut now);
    }

    let mut sec = now.tv_sec.saturating_add(remaining.as_secs() as libc::time_t);
    let mut nsec = now.tv_nsec + remaining.subsec_nanos() as libc::c_long;
    if nsec >= 1_000_000_000 {
        sec = sec.saturating_add(1);
        nsec -= 1_000_000_000;
    }

    libc::timespec {
        tv_sec: sec,
        tv_nsec: nsec,
    }
}
