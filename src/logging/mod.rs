// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log facade, record rendering and the core's own diagnostics
//
// Producers go through `Log`; everything the core itself needs to report
// (failed writes, drops, backend fallback) goes through `Diagnostics`.

mod diag;
mod facility;
mod logger;
#[macro_use]
mod macros;
mod record;
mod severity;

pub use diag::{
    DiagnosticEvent, DiagnosticSink, Diagnostics, MemorySink, SilentSink, StderrJsonSink,
};
pub use facility::Facility;
pub use logger::Log;
pub use record::{MessageRecord, TIMESTAMP_FORMAT};
pub use severity::Severity;
