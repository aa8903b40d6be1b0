// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Errors surfaced synchronously to callers.
//!
//! Only construction and output registration can fail from a caller's point
//! of view. I/O failures after a record has been handed to the writer are
//! reported on the diagnostic channel instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Queue capacity must be greater than 0")]
    ZeroCapacity,

    #[error("Invalid ring depth {0}: must be greater than 0")]
    InvalidRingDepth(u32),

    #[error("Failed to open output file '{}': {source}", path.display())]
    OutputOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Output {0} is not open on this writer")]
    UnknownOutput(usize),

    #[error("Failed to set up submission ring: {0}")]
    RingSetup(#[source] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
