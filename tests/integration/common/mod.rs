// SPDX-License-Identifier: Apache-2.0 OR MIT
// Integration test utilities
//
// Helpers to build a facade over a temporary directory and to parse the
// records it leaves on disk.

use regex::Regex;
use ringlog::{DiagnosticsTarget, LogConfig, RingBackend};
use std::path::Path;
use std::sync::OnceLock;

/// `<timestamp> <tid> <file>:<line> [INFO] thread=<n> seq=<n>`
pub const WORKLOAD_LINE: &str =
    r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{9} \d+ \S+:\d+ \[INFO\] thread=(\d+) seq=(\d+)$";

pub fn workload_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(WORKLOAD_LINE).unwrap())
}

/// Config writing to `<dir>/out.log` with diagnostics silenced.
pub fn test_config(dir: &Path, backend: RingBackend, capacity: usize, depth: u32) -> LogConfig {
    LogConfig {
        queue_capacity: capacity,
        ring_depth: depth,
        backend,
        diagnostics: DiagnosticsTarget::Silent,
        ..LogConfig::with_output(dir.join("out.log"))
    }
}

/// Parse every line as a workload record, panicking on the first that
/// doesn't match.
pub fn parse_workload(contents: &str) -> Vec<(u64, u64)> {
    contents
        .lines()
        .map(|line| {
            let caps = workload_line()
                .captures(line)
                .unwrap_or_else(|| panic!("malformed record: {:?}", line));
            (caps[1].parse().unwrap(), caps[2].parse().unwrap())
        })
        .collect()
}
