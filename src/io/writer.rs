// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Batched asynchronous writer
//!
//! Many threads may call [`AsyncWriter::write`] at once. Each call claims a
//! ticket and waits on the writer's turn sequencer, so exactly one caller at
//! a time touches the submission ring and the in-flight table; rendering the
//! record happens before that, fully in parallel.
//!
//! Every record gets the next contiguous byte range of its output file at
//! preparation time and is written there with a positional write. The file
//! therefore ends up in submission order however the kernel orders the
//! completions.
//!
//! Once half the ring depth is prepared, the batch is submitted and the
//! caller blocks until all of it has completed. Record buffers live in the
//! in-flight table, keyed by completion tag, until their completion arrives.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, describe_counter};

use super::ring::{Completion, CompletionRing, WriteRequest};
use crate::error::{Error, Result};
use crate::logging::{Diagnostics, Facility, MessageRecord};
use crate::queue::CacheAligned;
use crate::sync::turn_sequencer::claim_ticket;
use crate::sync::wait::ADAPTATION_FREQ;
use crate::sync::{FutexWait, SpinCutoff, TurnSequencer, WaitStrategy};

const OUTPUT_FILE_MODE: u32 = 0o644;

/// Handle to a file registered with [`AsyncWriter::register_output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(usize);

/// Snapshot of writer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Writes handed to the kernel
    pub submitted: u64,
    /// Writes completed in full
    pub completed: u64,
    /// Writes that completed with an error or short
    pub failed: u64,
    /// Records never submitted (ring full, unknown output, shutdown failure)
    pub dropped: u64,
    pub bytes_written: u64,
}

#[derive(Default)]
struct WriterCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    bytes_written: AtomicU64,
}

impl WriterCounters {
    fn snapshot(&self) -> WriterStats {
        WriterStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }

    fn add_dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
        counter!("ringlog_records_dropped").increment(n);
    }
}

/// State reachable from any turn holder.
struct Shared {
    counters: WriterCounters,
    diagnostics: Diagnostics,
}

struct OutputFile {
    file: File,
    path: PathBuf,
    next_offset: u64,
}

struct InFlight {
    output: usize,
    record: MessageRecord,
}

/// Everything only the current turn holder may touch.
struct WriterState<R> {
    ring: R,
    batch_threshold: usize,
    /// Indexed by `OutputId`; `None` once closed.
    outputs: Vec<Option<OutputFile>>,
    /// Replaced files whose writes never completed; closed on drop.
    retired: Vec<File>,
    in_flight: HashMap<u64, InFlight>,
    /// Prepared entries not yet handed to the kernel
    unsubmitted: usize,
    next_user_data: u64,
    completions: Vec<Completion>,
}

pub struct AsyncWriter<R: CompletionRing, W: WaitStrategy = FutexWait> {
    ticket: CacheAligned<AtomicU64>,
    sequencer: TurnSequencer,
    spin_cutoff: SpinCutoff,
    strategy: W,
    state: UnsafeCell<WriterState<R>>,
    shared: Shared,
}

// SAFETY: AsyncWriter is Sync because:
// - `state` is only accessed by the holder of the current sequencer turn
// - turns are handed over with acquire/release ordering by the sequencer
// - everything else is atomics or the Sync diagnostics handle
unsafe impl<R: CompletionRing, W: WaitStrategy> Sync for AsyncWriter<R, W> {}

/// Completes the held turn on drop, so a panicking caller cannot stall the
/// writer.
struct TurnGuard<'a, W: WaitStrategy> {
    sequencer: &'a TurnSequencer,
    strategy: &'a W,
    turn: u32,
}

impl<W: WaitStrategy> Drop for TurnGuard<'_, W> {
    fn drop(&mut self) {
        self.sequencer.complete_turn(self.turn, self.strategy);
    }
}

impl<R: CompletionRing> AsyncWriter<R> {
    pub fn new(ring: R, diagnostics: Diagnostics) -> Result<Self> {
        Self::with_strategy(ring, diagnostics, FutexWait)
    }
}

impl<R: CompletionRing, W: WaitStrategy> AsyncWriter<R, W> {
    pub fn with_strategy(ring: R, diagnostics: Diagnostics, strategy: W) -> Result<Self> {
        let depth = ring.depth();
        if depth == 0 {
            return Err(Error::InvalidRingDepth(depth));
        }
        describe_metrics();

        let batch_threshold = (depth as usize / 2).max(1);
        diagnostics.debug(
            Facility::Writer,
            &format!(
                "Writer started: backend={} depth={} batch={}",
                ring.name(),
                depth,
                batch_threshold
            ),
        );

        Ok(Self {
            ticket: CacheAligned(AtomicU64::new(0)),
            sequencer: TurnSequencer::new(0),
            spin_cutoff: SpinCutoff::new(),
            strategy,
            state: UnsafeCell::new(WriterState {
                ring,
                batch_threshold,
                outputs: Vec::new(),
                retired: Vec::new(),
                in_flight: HashMap::with_capacity(depth as usize),
                unsubmitted: 0,
                next_user_data: 0,
                completions: Vec::with_capacity(depth as usize),
            }),
            shared: Shared {
                counters: WriterCounters::default(),
                diagnostics,
            },
        })
    }

    /// Open (creating if needed) `path` for appending records.
    ///
    /// Records are placed after whatever the file already holds.
    pub fn register_output(&self, path: impl AsRef<Path>) -> Result<OutputId> {
        let path = path.as_ref();
        let output = open_output(path)?;
        let next_offset = output.next_offset;

        let id = self.with_state(|state, _| {
            state.outputs.push(Some(output));
            OutputId(state.outputs.len() - 1)
        });

        self.shared.diagnostics.debug(
            Facility::Writer,
            &format!(
                "Output registered: {} (starting at byte {})",
                path.display(),
                next_offset
            ),
        );
        Ok(id)
    }

    /// Point `output` at `path`, closing the file it wrote to so far.
    ///
    /// Everything already handed to the writer for `output` is written to
    /// the old file first. On error the old file stays in place.
    pub fn reopen_output(&self, output: OutputId, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let replacement = open_output(path)?;
        let next_offset = replacement.next_offset;

        let old_path = self.with_state(|state, shared| {
            state.drain_all(shared);
            let slot = state.outputs.get_mut(output.0)?;
            let old = slot.take()?;
            *slot = Some(replacement);
            let old_path = old.path.clone();
            state.retire(shared, output.0, old);
            Some(old_path)
        });

        match old_path {
            Some(old_path) => {
                self.shared.diagnostics.debug(
                    Facility::Writer,
                    &format!(
                        "Output {} reopened: {} -> {} (starting at byte {})",
                        output.0,
                        old_path.display(),
                        path.display(),
                        next_offset
                    ),
                );
                Ok(())
            }
            None => Err(Error::UnknownOutput(output.0)),
        }
    }

    /// Write out everything pending for `output` and close its file.
    ///
    /// Later writes to `output` are dropped and reported. Returns `false` if
    /// `output` was not open.
    pub fn close_output(&self, output: OutputId) -> bool {
        self.with_state(|state, shared| {
            state.drain_all(shared);
            match state.outputs.get_mut(output.0).and_then(Option::take) {
                Some(old) => {
                    shared.diagnostics.debug(
                        Facility::Writer,
                        &format!("Output closed: {}", old.path.display()),
                    );
                    state.retire(shared, output.0, old);
                    true
                }
                None => false,
            }
        })
    }

    /// Queue `record` for `output`. Submits and waits for the batch once
    /// half the ring is prepared.
    ///
    /// Never fails from the caller's view: I/O problems are counted and
    /// reported on the diagnostic channel.
    pub fn write(&self, output: OutputId, record: MessageRecord) {
        self.with_state(|state, shared| state.write(shared, output, record));
    }

    /// Submit everything prepared and wait until no write is in flight.
    pub fn flush(&self) {
        self.with_state(|state, shared| state.drain_all(shared));
    }

    pub fn stats(&self) -> WriterStats {
        self.shared.counters.snapshot()
    }

    /// Records prepared or submitted but not yet completed.
    pub fn outstanding(&self) -> usize {
        self.with_state(|state, _| state.in_flight.len())
    }

    /// Descriptor behind `output`, if it was registered here.
    pub fn output_fd(&self, output: OutputId) -> Option<RawFd> {
        self.with_state(|state, _| {
            state
                .outputs
                .get(output.0)
                .and_then(Option::as_ref)
                .map(|o| o.file.as_raw_fd())
        })
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.shared.diagnostics
    }

    /// Run `f` while holding the next writer turn.
    fn with_state<T>(&self, f: impl FnOnce(&mut WriterState<R>, &Shared) -> T) -> T {
        let ticket = claim_ticket(&self.ticket);
        let turn = ticket as u32;
        self.sequencer.wait_for_turn(
            turn,
            &self.strategy,
            &self.spin_cutoff,
            ticket % ADAPTATION_FREQ == 0,
        );
        let _guard = TurnGuard {
            sequencer: &self.sequencer,
            strategy: &self.strategy,
            turn,
        };
        // SAFETY: holding the turn gives exclusive access until `_guard` drops.
        let state = unsafe { &mut *self.state.get() };
        f(state, &self.shared)
    }
}

impl<R: CompletionRing> WriterState<R> {
    fn write(&mut self, shared: &Shared, output: OutputId, record: MessageRecord) {
        let Some(out) = self.outputs.get(output.0).and_then(Option::as_ref) else {
            shared.counters.add_dropped(1);
            shared.diagnostics.error(
                Facility::Writer,
                &format!("Record for unregistered output {:?} dropped", output),
            );
            return;
        };
        if record.is_empty() {
            shared.counters.add_dropped(1);
            shared.diagnostics.warning(
                Facility::Writer,
                &format!("Empty record for {} dropped", out.path.display()),
            );
            return;
        }
        let Ok(len) = u32::try_from(record.len()) else {
            shared.counters.add_dropped(1);
            shared.diagnostics.error(
                Facility::Writer,
                &format!("Record of {} bytes exceeds a single write, dropped", record.len()),
            );
            return;
        };

        let req = WriteRequest {
            fd: out.file.as_raw_fd(),
            buf: record.as_ptr(),
            len,
            offset: out.next_offset,
            user_data: self.next_user_data,
        };

        // SAFETY: `record` is moved into `in_flight` below without touching
        // its heap buffer and stays there until this tag completes.
        let mut prepared = unsafe { self.ring.prepare_write(req) };
        if prepared.is_err() {
            // Submission queue full: hand the pending batch over and retry once.
            self.submit_and_harvest(shared);
            // SAFETY: the first attempt was refused, so the ring holds no
            // reference to `req`; the same ownership argument applies.
            prepared = unsafe { self.ring.prepare_write(req) };
        }
        if prepared.is_err() {
            shared.counters.add_dropped(1);
            shared.diagnostics.warning(
                Facility::Ring,
                &format!(
                    "Submission queue full on {} ring, dropped {} byte record",
                    self.ring.name(),
                    len
                ),
            );
            return;
        }

        self.next_user_data = self.next_user_data.wrapping_add(1);
        if let Some(out) = self.outputs.get_mut(output.0).and_then(Option::as_mut) {
            out.next_offset += len as u64;
        }
        self.in_flight.insert(
            req.user_data,
            InFlight {
                output: output.0,
                record,
            },
        );
        self.unsubmitted += 1;

        if self.unsubmitted >= self.batch_threshold {
            self.submit_and_harvest(shared);
        }
    }

    /// Submit prepared entries, then block until every submitted write has
    /// completed.
    fn submit_and_harvest(&mut self, shared: &Shared) {
        if self.unsubmitted > 0 {
            match self.ring.submit() {
                Ok(n) => {
                    self.unsubmitted = self.unsubmitted.saturating_sub(n);
                    shared
                        .counters
                        .submitted
                        .fetch_add(n as u64, Ordering::Relaxed);
                    counter!("ringlog_writes_submitted").increment(n as u64);
                }
                Err(e) => {
                    shared.diagnostics.error(
                        Facility::Ring,
                        &format!("Submit failed on {} ring: {:#}", self.ring.name(), e),
                    );
                }
            }
        }

        let outstanding = self.in_flight.len().saturating_sub(self.unsubmitted);
        if outstanding == 0 {
            return;
        }

        self.completions.clear();
        if let Err(e) = self
            .ring
            .drain_completions(outstanding, &mut self.completions)
        {
            shared.diagnostics.error(
                Facility::Ring,
                &format!(
                    "Waiting for {} completions failed on {} ring: {:#}",
                    outstanding,
                    self.ring.name(),
                    e
                ),
            );
        }
        self.process_completions(shared);
    }

    fn process_completions(&mut self, shared: &Shared) {
        let mut completions = std::mem::take(&mut self.completions);

        for completion in completions.drain(..) {
            let Some(entry) = self.in_flight.remove(&completion.user_data) else {
                shared.diagnostics.error(
                    Facility::Writer,
                    &format!("Completion for unknown tag {}", completion.user_data),
                );
                continue;
            };

            let expected = entry.record.len();
            let path = self
                .outputs
                .get(entry.output)
                .and_then(Option::as_ref)
                .map(|o| o.path.display().to_string())
                .unwrap_or_default();

            if completion.result < 0 {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                counter!("ringlog_write_errors").increment(1);
                shared.diagnostics.error(
                    Facility::Writer,
                    &format!(
                        "Write to '{}' failed, {} byte record lost: {}",
                        path,
                        expected,
                        io::Error::from_raw_os_error(-completion.result)
                    ),
                );
            } else if (completion.result as usize) < expected {
                let written = completion.result as u64;
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                shared
                    .counters
                    .bytes_written
                    .fetch_add(written, Ordering::Relaxed);
                counter!("ringlog_write_errors").increment(1);
                counter!("ringlog_bytes_written").increment(written);
                shared.diagnostics.warning(
                    Facility::Writer,
                    &format!(
                        "Short write to '{}': {} of {} bytes",
                        path, written, expected
                    ),
                );
            } else {
                shared.counters.completed.fetch_add(1, Ordering::Relaxed);
                shared
                    .counters
                    .bytes_written
                    .fetch_add(expected as u64, Ordering::Relaxed);
                counter!("ringlog_writes_completed").increment(1);
                counter!("ringlog_bytes_written").increment(expected as u64);
            }
            // `entry.record` is released here, after its completion.
        }

        self.completions = completions;
    }

    /// Close `old`, which used to back output `index`, unless the kernel may
    /// still write through it.
    fn retire(&mut self, shared: &Shared, index: usize, old: OutputFile) {
        let pending = self.in_flight.values().filter(|f| f.output == index).count();
        if pending == 0 {
            drop(old);
            return;
        }
        shared.diagnostics.warning(
            Facility::Writer,
            &format!(
                "{} writes to '{}' still in flight, keeping it open until shutdown",
                pending,
                old.path.display()
            ),
        );
        self.retired.push(old.file);
    }

    /// Submit and harvest until nothing is in flight or the ring stops making
    /// progress.
    fn drain_all(&mut self, shared: &Shared) {
        while !self.in_flight.is_empty() {
            let before = self.in_flight.len();
            self.submit_and_harvest(shared);
            if self.in_flight.len() == before {
                shared.diagnostics.error(
                    Facility::Writer,
                    &format!("Ring made no progress, {} writes still in flight", before),
                );
                return;
            }
        }
    }
}

impl<R: CompletionRing, W: WaitStrategy> Drop for AsyncWriter<R, W> {
    fn drop(&mut self) {
        let shared = &self.shared;
        let state = self.state.get_mut();
        state.drain_all(shared);

        if !state.in_flight.is_empty() {
            // The kernel may still read these buffers; leak rather than free.
            let lost = state.in_flight.len() as u64;
            for (_, entry) in state.in_flight.drain() {
                std::mem::forget(entry.record);
            }
            shared.counters.add_dropped(lost);
            shared.diagnostics.error(
                Facility::Writer,
                &format!("{} writes never completed; their buffers were leaked", lost),
            );
        }

        let stats = shared.counters.snapshot();
        shared.diagnostics.debug(
            Facility::Writer,
            &format!(
                "[STATS:Writer FINAL] submitted={} completed={} failed={} dropped={} bytes={}",
                stats.submitted,
                stats.completed,
                stats.failed,
                stats.dropped,
                stats.bytes_written
            ),
        );
    }
}

/// Open (creating if needed) `path` positioned after its current contents.
fn open_output(path: &Path) -> Result<OutputFile> {
    let open_error = |source: io::Error| Error::OutputOpen {
        path: path.to_path_buf(),
        source,
    };

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .mode(OUTPUT_FILE_MODE)
        .open(path)
        .map_err(open_error)?;
    let next_offset = file.metadata().map_err(open_error)?.len();

    Ok(OutputFile {
        file,
        path: path.to_path_buf(),
        next_offset,
    })
}

fn describe_metrics() {
    describe_counter!("ringlog_writes_submitted", "Writes handed to the kernel ring");
    describe_counter!("ringlog_writes_completed", "Writes completed in full");
    describe_counter!("ringlog_write_errors", "Writes that failed or completed short");
    describe_counter!("ringlog_bytes_written", "Bytes confirmed written");
    describe_counter!("ringlog_records_dropped", "Records discarded before submission");
}
