// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log facade: render, enqueue, drain into the writer past the watermark

use std::fmt;
use std::panic::Location;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

use super::{Diagnostics, Facility, MessageRecord, Severity};
use crate::config::{DiagnosticsTarget, LogConfig};
use crate::error::Result;
use crate::io::{open_ring, AsyncWriter, CompletionRing, OutputId, WriterStats};
use crate::queue::MpmcQueue;

/// Entry point for producers.
///
/// Each call renders its record on the calling thread, pushes it into the
/// queue (blocking while the queue is full) and, once the queue is at least
/// half full, moves records into the writer until it is below half again.
/// Dropping the facade drains and flushes everything still buffered.
///
/// Draining only claims records the counters show as pushed, but a claimed
/// record may still be in the middle of being stored by its producer; the
/// draining thread then waits on that slot until the store completes.
///
/// `Log` is `Sync`; share it by reference or `Arc` between producer threads.
pub struct Log {
    queue: MpmcQueue<MessageRecord>,
    writer: AsyncWriter<Box<dyn CompletionRing>>,
    output: OutputId,
    min_level: AtomicU8,
    watermark: usize,
}

impl Log {
    /// Validate `config`, set up the configured ring backend and open the
    /// output file.
    pub fn open(config: &LogConfig) -> Result<Self> {
        config.validate()?;
        let diagnostics = match config.diagnostics {
            DiagnosticsTarget::Stderr => Diagnostics::stderr_json(),
            DiagnosticsTarget::Silent => Diagnostics::silent(),
        };
        let ring = open_ring(config.backend, config.ring_depth, &diagnostics)?;
        Self::with_ring(config, ring, diagnostics)
    }

    /// Like [`open`](Self::open) with a caller-supplied ring; the config's
    /// `backend` and `diagnostics` fields are ignored.
    pub fn with_ring(
        config: &LogConfig,
        ring: Box<dyn CompletionRing>,
        diagnostics: Diagnostics,
    ) -> Result<Self> {
        config.validate()?;
        let queue = MpmcQueue::new(config.queue_capacity)?;
        let writer = AsyncWriter::new(ring, diagnostics)?;
        let output = writer.register_output(&config.output_path)?;

        Ok(Self {
            watermark: (queue.capacity() / 2).max(1),
            queue,
            writer,
            output,
            min_level: AtomicU8::new(config.min_level as u8),
        })
    }

    #[inline]
    pub fn enabled(&self, level: Severity) -> bool {
        (level as u8) <= self.min_level.load(Ordering::Relaxed)
    }

    /// Render and enqueue one record attributed to `location`.
    pub fn log(&self, level: Severity, location: &Location<'_>, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        let record = MessageRecord::render(level, location, args);
        self.queue.push(record);

        if self.queue.size() >= self.watermark {
            self.drain_below_watermark();
        }
    }

    #[track_caller]
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Severity::Debug, Location::caller(), args);
    }

    #[track_caller]
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Severity::Info, Location::caller(), args);
    }

    #[track_caller]
    pub fn warning(&self, args: fmt::Arguments<'_>) {
        self.log(Severity::Warning, Location::caller(), args);
    }

    #[track_caller]
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Severity::Error, Location::caller(), args);
    }

    /// Log at `Fatal` and flush to disk before returning. Does not abort.
    #[track_caller]
    pub fn fatal(&self, args: fmt::Arguments<'_>) {
        self.log(Severity::Fatal, Location::caller(), args);
        self.flush();
    }

    /// Move every buffered record into the writer and wait for all writes.
    pub fn flush(&self) {
        self.drain_all();
        self.writer.flush();
    }

    /// Send subsequent records to `path` and close the previous file.
    /// Records buffered so far are flushed to the previous file first; if
    /// `path` cannot be opened the previous file stays in use.
    pub fn set_output_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.drain_all();
        self.writer.reopen_output(self.output, path)?;
        self.writer.diagnostics().info(
            Facility::Facade,
            &format!("Output switched to {}", path.display()),
        );
        Ok(())
    }

    pub fn set_min_level(&self, level: Severity) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn min_level(&self) -> Severity {
        Severity::from_u8(self.min_level.load(Ordering::Relaxed)).unwrap_or(Severity::Debug)
    }

    /// Records currently buffered in the queue.
    pub fn queued(&self) -> usize {
        self.queue.size()
    }

    pub fn writer_stats(&self) -> WriterStats {
        self.writer.stats()
    }

    /// May wait on a slot whose producer has claimed but not yet filled it.
    fn drain_below_watermark(&self) {
        while self.queue.size() >= self.watermark {
            match self.queue.read_if_not_empty() {
                Some(record) => self.writer.write(self.output, record),
                None => break,
            }
        }
    }

    fn drain_all(&self) {
        while let Some(record) = self.queue.read_if_not_empty() {
            self.writer.write(self.output, record);
        }
    }
}

impl Drop for Log {
    fn drop(&mut self) {
        self.flush();
        // `writer` drops after this and waits for anything still in flight.
    }
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log")
            .field("queue", &self.queue)
            .field("min_level", &self.min_level())
            .field("writer", &self.writer.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryFiles, MemoryRing};
    use crate::logging::MemorySink;
    use std::sync::Arc;

    fn memory_log(capacity: usize, depth: u32) -> (Log, MemoryFiles, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            queue_capacity: capacity,
            ring_depth: depth,
            ..LogConfig::with_output(dir.path().join("out.log"))
        };
        let ring = MemoryRing::new(depth);
        let files = ring.files();
        let log = Log::with_ring(&config, Box::new(ring), Diagnostics::silent()).unwrap();
        (log, files, dir)
    }

    fn only_file(files: &MemoryFiles) -> String {
        let snapshot = files.snapshot();
        assert_eq!(snapshot.len(), 1);
        String::from_utf8(snapshot.into_values().next().unwrap()).unwrap()
    }

    #[test]
    fn test_records_buffer_until_watermark() {
        let (log, files, _dir) = memory_log(8, 4);

        for i in 0..3 {
            log.info(format_args!("record {}", i));
        }
        assert_eq!(log.queued(), 3);
        assert!(files.snapshot().is_empty());

        // Fourth record reaches capacity / 2 and triggers a drain.
        log.info(format_args!("record 3"));
        assert_eq!(log.queued(), 3);
        assert_eq!(log.writer_stats().completed, 0);
    }

    #[test]
    fn test_drop_flushes_everything() {
        let (log, files, _dir) = memory_log(8, 4);
        for i in 0..5 {
            log.warning(format_args!("record {}", i));
        }
        drop(log);

        let contents = only_file(&files);
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        for (i, line) in lines.iter().enumerate() {
            assert!(line.ends_with(&format!("[WARNING] record {}", i)), "{}", line);
            assert!(line.contains("logger.rs:"), "{}", line);
        }
    }

    #[test]
    fn test_min_level_filters_before_rendering() {
        let (log, files, _dir) = memory_log(8, 4);
        log.set_min_level(Severity::Warning);
        assert_eq!(log.min_level(), Severity::Warning);

        log.debug(format_args!("hidden"));
        log.info(format_args!("hidden"));
        log.error(format_args!("shown"));
        assert_eq!(log.queued(), 1);
        log.flush();

        let contents = only_file(&files);
        assert!(contents.contains("[ERROR] shown"));
        assert!(!contents.contains("hidden"));
    }

    #[test]
    fn test_fatal_flushes_immediately() {
        let (log, files, _dir) = memory_log(64, 8);
        log.fatal(format_args!("giving up: {}", "disk gone"));
        assert_eq!(log.queued(), 0);
        assert!(only_file(&files).contains("[FATAL] giving up: disk gone"));
    }

    #[test]
    fn test_set_output_file_retargets() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.log");
        let second = dir.path().join("second.log");
        let config = LogConfig {
            queue_capacity: 16,
            ring_depth: 4,
            backend: crate::config::RingBackend::Blocking,
            diagnostics: DiagnosticsTarget::Silent,
            ..LogConfig::with_output(&first)
        };

        let log = Log::open(&config).unwrap();
        log.info(format_args!("before switch"));
        log.set_output_file(&second).unwrap();
        log.info(format_args!("after switch"));
        drop(log);

        let first = std::fs::read_to_string(first).unwrap();
        let second = std::fs::read_to_string(second).unwrap();
        assert!(first.contains("before switch") && !first.contains("after switch"));
        assert!(second.contains("after switch") && !second.contains("before switch"));
    }

    #[test]
    fn test_repeated_retargets_do_not_leak_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            queue_capacity: 16,
            ring_depth: 4,
            backend: crate::config::RingBackend::Blocking,
            diagnostics: DiagnosticsTarget::Silent,
            ..LogConfig::with_output(dir.path().join("log.0"))
        };
        let log = Log::open(&config).unwrap();

        for i in 1..=50 {
            log.info(format_args!("record {}", i - 1));
            log.set_output_file(dir.path().join(format!("log.{}", i)))
                .unwrap();
        }

        let root = std::fs::canonicalize(dir.path()).unwrap();
        let held: Vec<_> = std::fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
            .filter(|target| target.starts_with(&root))
            .collect();
        assert_eq!(held, vec![root.join("log.50")]);

        drop(log);
        let first = std::fs::read_to_string(dir.path().join("log.0")).unwrap();
        assert!(first.ends_with("[INFO] record 0\n"), "{}", first);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LogConfig {
            queue_capacity: 0,
            ..LogConfig::default()
        };
        assert!(matches!(
            Log::open(&config),
            Err(crate::error::Error::Config(crate::config::ConfigError::ZeroCapacity))
        ));
    }

    #[test]
    fn test_unopenable_output_is_reported() {
        let sink = Arc::new(MemorySink::new());
        let config = LogConfig::with_output("/nonexistent-dir/for/ringlog/out.log");
        let result = Log::with_ring(
            &config,
            Box::new(MemoryRing::new(4)),
            Diagnostics::new(sink),
        );
        assert!(matches!(
            result,
            Err(crate::error::Error::OutputOpen { .. })
        ));
    }
}
