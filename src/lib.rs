// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Low-latency logging core.
//!
//! Producer threads render records and push them into a bounded MPMC queue
//! whose slots are gated by per-slot turn sequencers. Once the queue is half
//! full, records are moved into a batched writer that hands them to the
//! kernel through an `io_uring` submission ring and releases each buffer only
//! after its completion has been harvested.
//!
//! ```text
//! Log ──push──> MpmcQueue ──drain──> AsyncWriter ──submit──> ring ──> file
//! ```
//!
//! ```no_run
//! use ringlog::{log_info, Log, LogConfig};
//!
//! let log = Log::open(&LogConfig::with_output("/tmp/app.log"))?;
//! log_info!(log, "listening on port {}", 8080);
//! # Ok::<(), ringlog::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod io;
#[macro_use]
pub mod logging;
pub mod queue;
pub mod sync;

pub use config::{ConfigError, DiagnosticsTarget, LogConfig, RingBackend};
pub use error::{Error, Result};
pub use io::{AsyncWriter, CompletionRing, OutputId, WriterStats};
pub use logging::{Diagnostics, Log, MessageRecord, Severity};
pub use queue::MpmcQueue;
