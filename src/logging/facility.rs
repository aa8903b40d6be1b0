// SPDX-License-Identifier: Apache-2.0 OR MIT
// Diagnostic facilities (component identifiers)

use serde::{Deserialize, Serialize};

/// Identifies which internal component raised a diagnostic
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facility {
    /// MPMC queue and its slots
    Queue = 0,
    /// Turn sequencing and futex waits
    Sequencer = 1,
    /// Batched writer: submission, completion harvesting, buffer release
    Writer = 2,
    /// Kernel ring backend
    Ring = 3,
    /// Log facade
    Facade = 4,
    Config = 5,
}

impl Facility {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Facility::Queue => "Queue",
            Facility::Sequencer => "Sequencer",
            Facility::Writer => "Writer",
            Facility::Ring => "Ring",
            Facility::Facade => "Facade",
            Facility::Config => "Config",
        }
    }
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
