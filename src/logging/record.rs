// SPDX-License-Identifier: Apache-2.0 OR MIT
// Rendered log line with single ownership from producer to write completion

use std::fmt::{self, Write as _};
use std::ops::Deref;
use std::panic::Location;

use super::Severity;

/// Local time with nanoseconds, e.g. `2024-05-01 13:37:00.123456789`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// One fully rendered record line.
///
/// The buffer is moved, never copied: facade → queue slot → writer in-flight
/// table, and dropped only once the kernel reports the write finished. The
/// heap allocation does not move across those handoffs, so its address can
/// be handed to the kernel while the record sits in the in-flight table.
#[derive(Debug, PartialEq, Eq)]
pub struct MessageRecord {
    buf: Vec<u8>,
}

impl MessageRecord {
    pub fn from_vec(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    /// Render `<timestamp> <thread-id> <file>:<line> [<LEVEL>] <message>\n`
    /// using the current local time and the calling thread's kernel id.
    pub fn render(level: Severity, location: &Location<'_>, args: fmt::Arguments<'_>) -> Self {
        let now = chrono::Local::now();
        let thread = nix::unistd::gettid().as_raw();
        Self::render_with(
            now.format(TIMESTAMP_FORMAT),
            thread,
            location.file(),
            location.line(),
            level,
            args,
        )
    }

    pub(crate) fn render_with(
        timestamp: impl fmt::Display,
        thread: i32,
        file: &str,
        line: u32,
        level: Severity,
        args: fmt::Arguments<'_>,
    ) -> Self {
        let mut line_buf = String::with_capacity(128);
        let _ = write!(
            line_buf,
            "{} {} {}:{} [{}] {}",
            timestamp,
            thread,
            file,
            line,
            level.as_str(),
            args
        );
        line_buf.push('\n');
        Self {
            buf: line_buf.into_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl Deref for MessageRecord {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl From<Vec<u8>> for MessageRecord {
    fn from(buf: Vec<u8>) -> Self {
        Self::from_vec(buf)
    }
}

impl From<String> for MessageRecord {
    fn from(line: String) -> Self {
        Self::from_vec(line.into_bytes())
    }
}
