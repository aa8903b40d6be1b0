// SPDX-License-Identifier: Apache-2.0 OR MIT
//! io_uring backed ring

use anyhow::{Context, Result};
use io_uring::{opcode, types, IoUring};

use super::ring::{Completion, CompletionRing, WriteRequest};
use crate::error::Error;

pub struct UringRing {
    ring: IoUring,
    depth: u32,
}

impl UringRing {
    /// Set up a ring with `depth` submission entries.
    pub fn new(depth: u32) -> crate::error::Result<Self> {
        if depth == 0 {
            return Err(Error::InvalidRingDepth(depth));
        }
        let ring = IoUring::new(depth).map_err(Error::RingSetup)?;
        Ok(Self { ring, depth })
    }

    fn reap(&mut self, out: &mut Vec<Completion>) -> usize {
        let before = out.len();
        for cqe in self.ring.completion() {
            out.push(Completion {
                user_data: cqe.user_data(),
                result: cqe.result(),
            });
        }
        out.len() - before
    }
}

impl CompletionRing for UringRing {
    fn depth(&self) -> u32 {
        self.depth
    }

    unsafe fn prepare_write(&mut self, req: WriteRequest) -> Result<(), WriteRequest> {
        let write_op = opcode::Write::new(types::Fd(req.fd), req.buf, req.len)
            .offset(req.offset)
            .build()
            .user_data(req.user_data);
        // SAFETY: buffer validity until completion is the caller's contract.
        unsafe { self.ring.submission().push(&write_op) }.map_err(|_| req)
    }

    fn submit(&mut self) -> Result<usize> {
        loop {
            match self.ring.submit() {
                Ok(n) => return Ok(n),
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) => return Err(e).context("io_uring_enter (submit) failed"),
            }
        }
    }

    fn drain_completions(&mut self, min: usize, out: &mut Vec<Completion>) -> Result<()> {
        let mut reaped = self.reap(out);
        while reaped < min {
            match self.ring.submit_and_wait(min - reaped) {
                Ok(_) => {}
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => {}
                Err(e) => return Err(e).context("io_uring_enter (wait) failed"),
            }
            reaped += self.reap(out);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "io_uring"
    }
}
