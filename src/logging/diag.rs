// SPDX-License-Identifier: Apache-2.0 OR MIT
// Diagnostic channel for the logging core's own failures
//
// Producers never see I/O errors from the writer. Failed or short writes,
// dropped records and backend fallbacks are reported here instead.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use super::{Facility, Severity};

/// Destination for diagnostics
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, severity: Severity, facility: Facility, message: &str);
}

/// One JSON object per line on stderr
pub struct StderrJsonSink;

impl DiagnosticSink for StderrJsonSink {
    fn emit(&self, severity: Severity, facility: Facility, message: &str) {
        let msg = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": severity.as_str(),
            "facility": facility.as_str(),
            "message": message,
        });
        eprintln!("{}", msg);
    }
}

/// Discards everything
pub struct SilentSink;

impl DiagnosticSink for SilentSink {
    fn emit(&self, _severity: Severity, _facility: Facility, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub severity: Severity,
    pub facility: Facility,
    pub message: String,
}

/// Keeps every diagnostic in memory
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// True if some event at `severity` contains `needle`
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.events()
            .iter()
            .any(|e| e.severity == severity && e.message.contains(needle))
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, severity: Severity, facility: Facility, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(DiagnosticEvent {
                severity,
                facility,
                message: message.to_string(),
            });
        }
    }
}

/// Cloneable handle to a sink with a shared minimum level
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn DiagnosticSink>,
    min_level: Arc<AtomicU8>,
}

impl Diagnostics {
    /// Report at `Info` and above to `sink`
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            min_level: Arc::new(AtomicU8::new(Severity::Info as u8)),
        }
    }

    pub fn stderr_json() -> Self {
        Self::new(Arc::new(StderrJsonSink))
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(SilentSink))
    }

    pub fn set_min_level(&self, level: Severity) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    #[inline]
    pub fn enabled(&self, severity: Severity) -> bool {
        (severity as u8) <= self.min_level.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn log(&self, severity: Severity, facility: Facility, message: &str) {
        if self.enabled(severity) {
            self.sink.emit(severity, facility, message);
        }
    }

    #[inline]
    pub fn error(&self, facility: Facility, message: &str) {
        self.log(Severity::Error, facility, message);
    }

    #[inline]
    pub fn warning(&self, facility: Facility, message: &str) {
        self.log(Severity::Warning, facility, message);
    }

    #[inline]
    pub fn info(&self, facility: Facility, message: &str) {
        self.log(Severity::Info, facility, message);
    }

    #[inline]
    pub fn debug(&self, facility: Facility, message: &str) {
        self.log(Severity::Debug, facility, message);
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = Severity::from_u8(self.min_level.load(Ordering::Relaxed));
        f.debug_struct("Diagnostics")
            .field("min_level", &level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_level_filters() {
        let sink = Arc::new(MemorySink::new());
        let diag = Diagnostics::new(sink.clone());

        diag.debug(Facility::Writer, "hidden");
        diag.warning(Facility::Writer, "shown");
        assert_eq!(sink.events().len(), 1);
        assert!(sink.contains(Severity::Warning, "shown"));

        diag.set_min_level(Severity::Debug);
        diag.debug(Facility::Ring, "now visible");
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.events()[1].facility, Facility::Ring);
    }

    #[test]
    fn test_clones_share_level() {
        let sink = Arc::new(MemorySink::new());
        let diag = Diagnostics::new(sink.clone());
        let clone = diag.clone();

        diag.set_min_level(Severity::Error);
        clone.info(Facility::Facade, "filtered");
        clone.error(Facility::Facade, "kept");
        assert_eq!(sink.events().len(), 1);
    }
}
