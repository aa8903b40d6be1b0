// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Records reach the file in the order they were handed to the writer, on
//! every backend, whatever order the kernel completes them in.

use ringlog::io::{BlockingRing, MemoryRing, UringRing};
use ringlog::{AsyncWriter, CompletionRing, Diagnostics, MessageRecord};
use ringlog_test_macros::requires_io_uring;

const RECORDS: usize = 100;

fn record(i: usize) -> MessageRecord {
    MessageRecord::from(format!("record {:04}\n", i))
}

fn expected() -> String {
    (0..RECORDS).map(|i| format!("record {:04}\n", i)).collect()
}

fn write_all<R: CompletionRing>(ring: R) -> String {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordered.log");
    let writer = AsyncWriter::new(ring, Diagnostics::silent()).unwrap();
    let out = writer.register_output(&path).unwrap();
    for i in 0..RECORDS {
        writer.write(out, record(i));
    }
    drop(writer);
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn test_blocking_ring_preserves_order() {
    assert_eq!(write_all(BlockingRing::new(8)), expected());
}

#[test]
#[requires_io_uring]
fn test_io_uring_preserves_order() {
    assert_eq!(write_all(UringRing::new(8).unwrap()), expected());
}

#[test]
fn test_reversed_completions_preserve_order() {
    let ring = MemoryRing::new(8).reverse_completions(true);
    let files = ring.files();

    let dir = tempfile::tempdir().unwrap();
    let writer = AsyncWriter::new(ring, Diagnostics::silent()).unwrap();
    let out = writer.register_output(dir.path().join("ordered.log")).unwrap();
    let fd = writer.output_fd(out).unwrap();
    for i in 0..RECORDS {
        writer.write(out, record(i));
    }
    drop(writer);

    assert_eq!(String::from_utf8(files.contents(fd)).unwrap(), expected());
}
