// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Kernel I/O: ring backends and the batched writer on top of them.

mod blocking;
mod memory;
mod ring;
mod uring;
mod writer;

pub use blocking::BlockingRing;
pub use memory::{MemoryFiles, MemoryRing};
pub use ring::{Completion, CompletionRing, WriteRequest};
pub use uring::UringRing;
pub use writer::{AsyncWriter, OutputId, WriterStats};

use crate::config::RingBackend;
use crate::error::Result;
use crate::logging::{Diagnostics, Facility};

/// Build the ring selected by `backend`.
///
/// `Auto` tries io_uring first and falls back to blocking writes (with a
/// warning) when the kernel refuses the ring.
pub fn open_ring(
    backend: RingBackend,
    depth: u32,
    diagnostics: &Diagnostics,
) -> Result<Box<dyn CompletionRing>> {
    match backend {
        RingBackend::IoUring => Ok(Box::new(UringRing::new(depth)?)),
        RingBackend::Blocking => Ok(Box::new(BlockingRing::new(depth))),
        RingBackend::Auto => match UringRing::new(depth) {
            Ok(ring) => Ok(Box::new(ring)),
            Err(crate::error::Error::RingSetup(e)) => {
                diagnostics.warning(
                    Facility::Ring,
                    &format!("io_uring unavailable ({}), using blocking writes", e),
                );
                Ok(Box::new(BlockingRing::new(depth)))
            }
            Err(e) => Err(e),
        },
    }
}
