// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Bounded MPMC queue built from turn-gated slots.

mod mpmc;
mod slot;

pub use mpmc::MpmcQueue;

use std::ops::Deref;

/// Keeps hot atomics on their own cache line.
#[repr(align(64))]
#[derive(Debug, Default)]
pub(crate) struct CacheAligned<T>(pub(crate) T);

impl<T> Deref for CacheAligned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}
