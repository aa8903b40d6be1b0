// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Submission/completion ring interface
//!
//! Models the `io_uring` contract the writer relies on: write entries are
//! prepared into a bounded submission queue, handed to the kernel in one
//! `submit`, and come back as completions carrying the entry's `user_data`
//! tag plus bytes written or a negative errno.

use std::os::fd::RawFd;

use anyhow::Result;

/// One positional write to be submitted.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest {
    pub fd: RawFd,
    pub buf: *const u8,
    pub len: u32,
    pub offset: u64,
    /// Echoed back in the matching [`Completion`]
    pub user_data: u64,
}

// SAFETY: a WriteRequest is an address plus metadata; whoever prepares it
// guarantees the buffer outlives its completion (see `prepare_write`).
unsafe impl Send for WriteRequest {}

/// Result of one submitted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub user_data: u64,
    /// Bytes written, or `-errno`
    pub result: i32,
}

pub trait CompletionRing: Send {
    /// Maximum number of prepared-but-unsubmitted entries.
    fn depth(&self) -> u32;

    /// Queue `req` for the next [`submit`](Self::submit). Hands the request
    /// back if the submission queue is full.
    ///
    /// # Safety
    /// `req.buf..req.buf + req.len` must stay valid and unmodified until a
    /// completion with `req.user_data` has been returned by
    /// [`drain_completions`](Self::drain_completions).
    unsafe fn prepare_write(&mut self, req: WriteRequest) -> Result<(), WriteRequest>;

    /// Hand every prepared entry to the kernel. Returns how many were taken.
    fn submit(&mut self) -> Result<usize>;

    /// Block until at least `min` completions are available, then append all
    /// available completions to `out`.
    fn drain_completions(&mut self, min: usize, out: &mut Vec<Completion>) -> Result<()>;

    /// Short backend name for diagnostics
    fn name(&self) -> &'static str;
}

impl<R: CompletionRing + ?Sized> CompletionRing for Box<R> {
    fn depth(&self) -> u32 {
        (**self).depth()
    }

    unsafe fn prepare_write(&mut self, req: WriteRequest) -> Result<(), WriteRequest> {
        (**self).prepare_write(req)
    }

    fn submit(&mut self) -> Result<usize> {
        (**self).submit()
    }

    fn drain_completions(&mut self, min: usize, out: &mut Vec<Completion>) -> Result<()> {
        (**self).drain_completions(min, out)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
