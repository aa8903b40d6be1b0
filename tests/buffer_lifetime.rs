// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Record buffers must stay allocated until their write completes.
//!
//! A tracking allocator remembers the allocations made while a record is
//! built; the ring's completion observer checks they are still live when the
//! kernel (here: `MemoryRing`) reads them. Lives in its own test binary since
//! the global allocator is per binary.

use ringlog::io::MemoryRing;
use ringlog::{AsyncWriter, Diagnostics, MessageRecord};
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SLOTS: usize = 64;

struct TrackingAlloc;

static TRACKED: [AtomicUsize; SLOTS] = [const { AtomicUsize::new(0) }; SLOTS];
static LIVE: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static TRACKING: Cell<bool> = const { Cell::new(false) };
}

unsafe impl GlobalAlloc for TrackingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() && TRACKING.with(|t| t.get()) {
            for slot in TRACKED.iter() {
                if slot
                    .compare_exchange(0, ptr as usize, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    LIVE.fetch_add(1, Ordering::SeqCst);
                    break;
                }
            }
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        for slot in TRACKED.iter() {
            if slot
                .compare_exchange(ptr as usize, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                LIVE.fetch_sub(1, Ordering::SeqCst);
                break;
            }
        }
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: TrackingAlloc = TrackingAlloc;

fn tracked_record(i: usize) -> MessageRecord {
    let line = format!("buffer {:03}\n", i);
    TRACKING.with(|t| t.set(true));
    let buf = line.as_bytes().to_vec();
    TRACKING.with(|t| t.set(false));
    MessageRecord::from_vec(buf)
}

#[test]
fn test_buffers_live_until_completion() {
    const RECORDS: usize = 40;

    let completions = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&completions);
    let ring = MemoryRing::new(8).on_complete(move |completion| {
        assert!(completion.result > 0, "write failed: {}", completion.result);
        // The buffer behind this completion has not been released yet.
        assert!(LIVE.load(Ordering::SeqCst) >= 1);
        observed.fetch_add(1, Ordering::SeqCst);
    });
    let files = ring.files();

    let dir = tempfile::tempdir().unwrap();
    let writer = AsyncWriter::new(ring, Diagnostics::silent()).unwrap();
    let out = writer.register_output(dir.path().join("lifetime.log")).unwrap();
    let fd = writer.output_fd(out).unwrap();

    let mut handed_over = 0;
    for i in 0..RECORDS {
        writer.write(out, tracked_record(i));
        handed_over += 1;
        // Everything not yet completed is still owned by the writer.
        let outstanding = handed_over - completions.load(Ordering::SeqCst);
        assert_eq!(LIVE.load(Ordering::SeqCst), outstanding);
    }
    drop(writer);

    assert_eq!(completions.load(Ordering::SeqCst), RECORDS);
    assert_eq!(LIVE.load(Ordering::SeqCst), 0, "every buffer released after drop");

    let expected: String = (0..RECORDS).map(|i| format!("buffer {:03}\n", i)).collect();
    assert_eq!(String::from_utf8(files.contents(fd)).unwrap(), expected);
}
