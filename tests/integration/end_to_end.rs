// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Producers on many threads through the facade to a real file.

use crate::common::{parse_workload, test_config};
use ringlog::{log_info, Log, RingBackend};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

const THREADS: u64 = 8;
const PER_THREAD: u64 = 1000;

fn run_workload(backend: RingBackend) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), backend, 64, 8);
    let log = Arc::new(Log::open(&config).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|thread| {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for seq in 0..PER_THREAD {
                    log_info!(log, "thread={} seq={}", thread, seq);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = log.writer_stats();
    drop(log);

    let contents = std::fs::read_to_string(&config.output_path).unwrap();
    let records = parse_workload(&contents);
    assert_eq!(records.len() as u64, THREADS * PER_THREAD);

    let seen: HashSet<(u64, u64)> = records.into_iter().collect();
    let expected: HashSet<(u64, u64)> = (0..THREADS)
        .flat_map(|t| (0..PER_THREAD).map(move |s| (t, s)))
        .collect();
    assert_eq!(seen, expected, "every record exactly once");
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.dropped, 0);
}

#[test]
#[cfg_attr(tarpaulin, ignore)]
fn test_many_producers_default_backend() {
    run_workload(RingBackend::Auto);
}

#[test]
#[cfg_attr(tarpaulin, ignore)]
fn test_many_producers_blocking_backend() {
    run_workload(RingBackend::Blocking);
}

#[test]
fn test_output_file_grows_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), RingBackend::Blocking, 16, 4);

    for session in 0..2u64 {
        let log = Log::open(&config).unwrap();
        for seq in 0..10u64 {
            log_info!(log, "thread={} seq={}", session, seq);
        }
    }

    let contents = std::fs::read_to_string(&config.output_path).unwrap();
    let records = parse_workload(&contents);
    let expected: Vec<(u64, u64)> = (0..2)
        .flat_map(|t| (0..10).map(move |s| (t, s)))
        .collect();
    assert_eq!(records, expected);
}
