// SPDX-License-Identifier: Apache-2.0 OR MIT
//! In-memory ring for tests
//!
//! Behaves like a kernel ring that finishes its work lazily: submitted
//! buffers are read only when their completion is drained, so a buffer
//! released too early is read after free (and shows up under Miri or a
//! poisoning allocator). Bytes land in [`MemoryFiles`] keyed by fd instead of
//! on disk.

use std::collections::{HashMap, VecDeque};
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use super::ring::{Completion, CompletionRing, WriteRequest};

/// Shared view of everything a [`MemoryRing`] has "written".
#[derive(Clone, Default)]
pub struct MemoryFiles {
    files: Arc<Mutex<HashMap<RawFd, Vec<u8>>>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents written to `fd` so far.
    pub fn contents(&self, fd: RawFd) -> Vec<u8> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(&fd).cloned())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<RawFd, Vec<u8>> {
        self.files
            .lock()
            .map(|files| files.clone())
            .unwrap_or_default()
    }

    fn write_at(&self, fd: RawFd, offset: u64, bytes: &[u8]) {
        if let Ok(mut files) = self.files.lock() {
            let file = files.entry(fd).or_default();
            let start = offset as usize;
            let end = start + bytes.len();
            if file.len() < end {
                file.resize(end, 0);
            }
            file[start..end].copy_from_slice(bytes);
        }
    }
}

type CompletionObserver = Box<dyn FnMut(&Completion) + Send>;

pub struct MemoryRing {
    depth: u32,
    files: MemoryFiles,
    prepared: Vec<WriteRequest>,
    submitted: VecDeque<WriteRequest>,
    fail_next: usize,
    reverse: bool,
    observer: Option<CompletionObserver>,
    submit_calls: usize,
}

impl MemoryRing {
    pub fn new(depth: u32) -> Self {
        Self::with_files(depth, MemoryFiles::new())
    }

    pub fn with_files(depth: u32, files: MemoryFiles) -> Self {
        Self {
            depth,
            files,
            prepared: Vec::new(),
            submitted: VecDeque::new(),
            fail_next: 0,
            reverse: false,
            observer: None,
            submit_calls: 0,
        }
    }

    pub fn files(&self) -> MemoryFiles {
        self.files.clone()
    }

    /// The next `count` writes to complete report `-EIO` and write nothing.
    pub fn fail_next(mut self, count: usize) -> Self {
        self.fail_next = count;
        self
    }

    /// Deliver each batch of completions newest first.
    pub fn reverse_completions(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Called for every completion before it is handed to the caller.
    pub fn on_complete(mut self, observer: impl FnMut(&Completion) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls
    }

    fn complete(&mut self, req: WriteRequest) -> Completion {
        let result = if self.fail_next > 0 {
            self.fail_next -= 1;
            -libc::EIO
        } else {
            // SAFETY: the preparer keeps the buffer alive until this
            // completion is returned.
            let bytes = unsafe { std::slice::from_raw_parts(req.buf, req.len as usize) };
            self.files.write_at(req.fd, req.offset, bytes);
            req.len as i32
        };
        Completion {
            user_data: req.user_data,
            result,
        }
    }
}

impl CompletionRing for MemoryRing {
    fn depth(&self) -> u32 {
        self.depth
    }

    unsafe fn prepare_write(&mut self, req: WriteRequest) -> Result<(), WriteRequest> {
        if self.prepared.len() >= self.depth as usize {
            return Err(req);
        }
        self.prepared.push(req);
        Ok(())
    }

    fn submit(&mut self) -> Result<usize> {
        self.submit_calls += 1;
        let n = self.prepared.len();
        self.submitted.extend(self.prepared.drain(..));
        Ok(n)
    }

    fn drain_completions(&mut self, min: usize, out: &mut Vec<Completion>) -> Result<()> {
        if self.submitted.len() < min {
            bail!(
                "waiting for {} completions but only {} writes are in flight",
                min,
                self.submitted.len()
            );
        }

        let mut batch: Vec<WriteRequest> = self.submitted.drain(..).collect();
        if self.reverse {
            batch.reverse();
        }
        for req in batch {
            let completion = self.complete(req);
            if let Some(observer) = self.observer.as_mut() {
                observer(&completion);
            }
            out.push(completion);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
