//! End-to-end scenarios from the specification's testable-properties
//! section, driven through the public facade against a real dispatch
//! thread.

use std::time::{Duration, Instant};

use config::{Algorithm, Config};
use coresim_engine::facade::System;

fn config(num_cpu: u32, scheduler: Algorithm, quantum: u32) -> Config {
    let _ = env_logger::try_init();

    Config {
        num_cpu,
        scheduler,
        batch_process_freq: 0, // disabled: these tests create processes explicitly
        min_ins: 1,
        max_ins: 50,
        delays_per_exec: 0,
        quantum_cycles: quantum,
        max_overall_mem: 64,
        mem_per_frame: 16,
        min_mem_per_proc: 16,
        max_mem_per_proc: 64,
    }
}

fn wait_until(mut pred: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    pred()
}

#[test]
fn s1_fcfs_single_process_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let system = System::initialize(config(1, Algorithm::Fcfs, 1), dir.path().join("backing.txt")).unwrap();

    system
        .create_custom_process(
            "p1",
            "DECLARE x 7; ADD y x 3; PRINT y; SLEEP 2",
            Some(16),
        )
        .unwrap();
    system.start_scheduler().unwrap();

    let finished = wait_until(
        || system.get_process("p1").map_or(false, |d| d.summary.finish_time.is_some()),
        Duration::from_secs(3),
    );
    assert!(finished, "process p1 never terminated");

    let detail = system.get_process("p1").unwrap();
    assert_eq!(detail.pages_allocated, 1);
    assert!(detail.log.last().unwrap().contains("10"));

    system.shutdown();
    assert_eq!(system.memory_stats().free_bytes, 64);
}

#[test]
fn s4_sleep_wake_ordering_shorter_sleep_finishes_first() {
    let dir = tempfile::tempdir().unwrap();
    let system = System::initialize(config(2, Algorithm::Fcfs, 1), dir.path().join("backing.txt")).unwrap();

    system.create_custom_process("p1", "SLEEP 5", Some(16)).unwrap();
    system.create_custom_process("p2", "SLEEP 2", Some(16)).unwrap();
    let before = system.memory_stats();
    system.start_scheduler().unwrap();

    let both_done = wait_until(
        || {
            system.get_process("p1").map_or(false, |d| d.summary.finish_time.is_some())
                && system.get_process("p2").map_or(false, |d| d.summary.finish_time.is_some())
        },
        Duration::from_secs(5),
    );
    assert!(both_done);

    let p1 = system.get_process("p1").unwrap();
    let p2 = system.get_process("p2").unwrap();
    assert!(p2.summary.finish_time.unwrap() <= p1.summary.finish_time.unwrap());

    system.shutdown();
    let after = system.memory_stats();
    assert_eq!(before.pages_paged_in, after.pages_paged_in);
    assert_eq!(before.pages_paged_out, after.pages_paged_out);
}

#[test]
fn s5_nested_for_loops_log_exactly_six_prints() {
    let dir = tempfile::tempdir().unwrap();
    let system = System::initialize(config(1, Algorithm::Fcfs, 1), dir.path().join("backing.txt")).unwrap();

    system
        .create_custom_process(
            "p1",
            "FOR i 1 3 1; FOR j 1 2 1; PRINT i+j; END_FOR; END_FOR",
            Some(16),
        )
        .unwrap();
    system.start_scheduler().unwrap();

    let finished = wait_until(
        || system.get_process("p1").map_or(false, |d| d.summary.finish_time.is_some()),
        Duration::from_secs(3),
    );
    assert!(finished);

    let detail = system.get_process("p1").unwrap();
    let prints = detail.log.iter().filter(|l| l.contains("PRINT")).count();
    assert_eq!(prints, 6);

    system.shutdown();
}

/// S6's narrative assumes every allocated page is resident at admission
/// (2 pages -> 2 resident frames); the implemented policy only makes the
/// first page resident immediately (spec §4.3's literal text, see
/// DESIGN.md), so this test checks the frame count that policy actually
/// claims rather than S6's number, while still exercising the same
/// termination-deallocates invariant S6 names.
#[test]
fn s6_termination_deallocates_all_resident_pages() {
    let dir = tempfile::tempdir().unwrap();
    let system = System::initialize(config(1, Algorithm::Fcfs, 1), dir.path().join("backing.txt")).unwrap();

    system.create_custom_process("p1", "PRINT x", Some(20)).unwrap(); // pages_allocated=2, 1 resident at admission
    assert_eq!(system.memory_stats().free_bytes, 64 - 16);

    system.start_scheduler().unwrap();
    let finished = wait_until(
        || system.get_process("p1").map_or(false, |d| d.summary.finish_time.is_some()),
        Duration::from_secs(3),
    );
    assert!(finished);
    system.shutdown();

    assert_eq!(system.memory_stats().free_bytes, 64);
    let detail = system.get_process("p1").unwrap();
    assert_eq!(detail.pages_allocated, 0);
}

/// Two 5-instruction processes on one core with quantum=2: RR should
/// interleave them 2 instructions at a time until each process's final,
/// shorter slice (spec §8 S2, §4.1).
#[test]
fn s2_round_robin_quantum_preempts_at_two_instructions() {
    let dir = tempfile::tempdir().unwrap();
    let system = System::initialize(config(1, Algorithm::Rr, 2), dir.path().join("backing.txt")).unwrap();

    let body = "PRINT a; PRINT a; PRINT a; PRINT a; PRINT a";
    system.create_custom_process("p1", body, Some(16)).unwrap();
    system.create_custom_process("p2", body, Some(16)).unwrap();
    system.start_scheduler().unwrap();

    let both_done = wait_until(
        || {
            system.get_process("p1").map_or(false, |d| d.summary.finish_time.is_some())
                && system.get_process("p2").map_or(false, |d| d.summary.finish_time.is_some())
        },
        Duration::from_secs(5),
    );
    assert!(both_done);

    let p1 = system.get_process("p1").unwrap();
    let p2 = system.get_process("p2").unwrap();

    let mut timeline: Vec<(u64, &str)> = Vec::new();
    for line in p1.log.iter().filter(|l| l.contains("PRINT")) {
        timeline.push((parse_tick(line), "p1"));
    }
    for line in p2.log.iter().filter(|l| l.contains("PRINT")) {
        timeline.push((parse_tick(line), "p2"));
    }
    timeline.sort_by_key(|(tick, _)| *tick);
    let owners: Vec<&str> = timeline.iter().map(|(_, owner)| *owner).collect();

    assert_eq!(owners.len(), 10);
    assert_eq!(
        owners,
        vec!["p1", "p1", "p2", "p2", "p1", "p1", "p2", "p2", "p1", "p2"]
    );

    system.shutdown();
}

fn parse_tick(log_line: &str) -> u64 {
    let inner = log_line
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .expect("log line starts with `(tick)`");
    inner.parse().expect("tick is numeric")
}

/// Demonstrates the admission policy actually implemented (spec §4.3: "one
/// page is sufficient" to admit), rather than §8's S3 narrative, which
/// assumes a stricter full-residency policy inconsistent with §4.3's text —
/// see DESIGN.md for the resolution.
#[test]
fn s3_fcfs_admission_fails_once_frames_are_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    // 1 frame total: the first process claims it, the second cannot admit.
    let mut cfg = config(1, Algorithm::Fcfs, 1);
    cfg.max_overall_mem = 16;
    cfg.mem_per_frame = 16;
    let system = System::initialize(cfg, dir.path().join("backing.txt")).unwrap();

    system.create_custom_process("p1", "PRINT x", Some(16)).unwrap();
    let err = system
        .create_custom_process("p2", "PRINT x", Some(16))
        .unwrap_err();
    assert!(matches!(err, coresim_engine::CreateProcessError::Admission(_)));
}
