//! Monitors and background threads owned by a test.
#![cfg(unix)]

mod common;

use common::TestOwner;
use std::fs;
use std::thread;
use std::time::{Duration, Instant};
use verdict_owner::{OutcomeKind, ProcessSpec};

#[test]
fn test_monitor_writes_samples_until_stopped() {
    let mut t = TestOwner::with_config(|mut c| {
        c.monitor.interval = Duration::from_millis(100);
        c.monitor.settle_delay = Duration::from_millis(50);
        c
    });
    let sleeper = t
        .owner
        .start_process(ProcessSpec::new("sleep").arg("3").display_name("sleeper").background())
        .unwrap();
    let monitor = t.owner.start_process_monitor(&sleeper, None).unwrap();
    let path = t.output("monitor-sleeper.tsv");

    let deadline = Instant::now() + Duration::from_secs(20);
    let rows = loop {
        let rows = fs::read_to_string(&path)
            .map(|text| text.lines().filter(|l| !l.starts_with('#')).count())
            .unwrap_or(0);
        if rows >= 3 || Instant::now() > deadline {
            break rows;
        }
        thread::sleep(Duration::from_millis(50));
    };
    assert!(rows >= 3, "only {} samples", rows);

    t.owner.stop_process_monitor(&monitor).unwrap();
    t.owner.stop_process_monitor(&monitor).unwrap();
    assert!(!monitor.running());

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("#Time\t"));
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 7);
        for field in &fields[1..] {
            field.parse::<i64>().unwrap();
        }
    }

    assert!(t.owner.wait_process(&sleeper, Some(Duration::from_secs(20))).unwrap());
    assert_eq!(sleeper.exit_status(), Some(0));
    assert!(t.owner.outcomes().is_empty());
}

#[test]
fn test_thread_join_timeout_reported_once() {
    let mut t = TestOwner::new();
    let thread = t
        .owner
        .start_background_thread("slow", |_ctx| {
            thread::sleep(Duration::from_millis(800));
            Ok(())
        })
        .unwrap();

    t.owner
        .join_background_thread(&thread, Some(Duration::from_millis(50)))
        .unwrap();
    t.owner
        .join_background_thread(&thread, Some(Duration::from_millis(50)))
        .unwrap();

    let outcomes = t.owner.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].kind, OutcomeKind::TimedOut);
    assert!(thread.stop_requested());
}

#[test]
fn test_thread_failure_after_stop_is_quiet() {
    let mut t = TestOwner::new();
    let thread = t
        .owner
        .start_background_thread("reader", |ctx| {
            ctx.stopping.wait(Duration::from_secs(30));
            anyhow::bail!("pipe closed")
        })
        .unwrap();

    thread.stop();
    t.owner.join_background_thread(&thread, None).unwrap();
    assert!(t.owner.outcomes().is_empty());
}

#[test]
fn test_cleanup_stops_threads() {
    let mut t = TestOwner::new();
    let thread = t
        .owner
        .start_background_thread("poller", |ctx| {
            while !ctx.stopping.wait(Duration::from_millis(20)) {}
            Ok(())
        })
        .unwrap();

    t.owner.cleanup();
    assert!(!thread.is_alive());
    assert!(t.owner.outcomes().is_empty());
}
