// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Synchronous fallback ring
//!
//! Performs each prepared write with `pwrite` at submit time and queues a
//! completion for it. Used when the kernel refuses io_uring setup (seccomp
//! filters, old kernels, `io_uring_disabled`).

use std::collections::VecDeque;
use std::os::fd::BorrowedFd;

use anyhow::{bail, Result};
use nix::errno::Errno;
use nix::sys::uio::pwrite;

use super::ring::{Completion, CompletionRing, WriteRequest};

pub struct BlockingRing {
    depth: u32,
    prepared: Vec<WriteRequest>,
    completed: VecDeque<Completion>,
}

impl BlockingRing {
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            prepared: Vec::with_capacity(depth as usize),
            completed: VecDeque::new(),
        }
    }

    fn perform(req: &WriteRequest) -> i32 {
        if req.fd < 0 {
            return -libc::EBADF;
        }
        // SAFETY: the preparer guarantees the buffer is live until completion,
        // and the fd stays open for as long as the output is registered.
        let (buf, fd) = unsafe {
            (
                std::slice::from_raw_parts(req.buf, req.len as usize),
                BorrowedFd::borrow_raw(req.fd),
            )
        };

        let mut written = 0usize;
        while written < buf.len() {
            match pwrite(fd, &buf[written..], (req.offset + written as u64) as libc::off_t) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(Errno::EINTR) => continue,
                Err(errno) if written == 0 => return -(errno as i32),
                // Report the partial write like the kernel would.
                Err(_) => break,
            }
        }
        written as i32
    }
}

impl CompletionRing for BlockingRing {
    fn depth(&self) -> u32 {
        self.depth
    }

    unsafe fn prepare_write(&mut self, req: WriteRequest) -> Result<(), WriteRequest> {
        if self.prepared.len() >= self.depth as usize {
            return Err(req);
        }
        self.prepared.push(req);
        Ok(())
    }

    fn submit(&mut self) -> Result<usize> {
        let submitted = self.prepared.len();
        for req in self.prepared.drain(..) {
            self.completed.push_back(Completion {
                user_data: req.user_data,
                result: Self::perform(&req),
            });
        }
        Ok(submitted)
    }

    fn drain_completions(&mut self, min: usize, out: &mut Vec<Completion>) -> Result<()> {
        if self.completed.len() < min {
            bail!(
                "waiting for {} completions but only {} writes were submitted",
                min,
                self.completed.len()
            );
        }
        out.extend(self.completed.drain(..));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "blocking"
    }
}
