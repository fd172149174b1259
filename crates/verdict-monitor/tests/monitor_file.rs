//! Monitoring a real child process into a tab-separated file.
#![cfg(unix)]

use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use verdict_monitor::{DelimitedFileHandler, MonitorOptions, MonitorTarget, ProcessMonitor};
use verdict_outcome::OutcomeTracker;

#[test]
fn test_monitor_writes_numeric_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitor-sleep.tsv");
    let mut child = Command::new("sleep").arg("30").spawn().unwrap();
    let tracker = Arc::new(OutcomeTracker::new());

    let monitor = ProcessMonitor::start(
        MonitorTarget::Pid(child.id()),
        MonitorOptions::default()
            .interval(Duration::from_millis(100))
            .settle_delay(Duration::from_millis(50)),
        vec![Box::new(DelimitedFileHandler::new(&path).unwrap())],
        Arc::clone(&tracker),
    )
    .unwrap();

    let mut rows = 0;
    for _ in 0..100 {
        thread::sleep(Duration::from_millis(50));
        rows = std::fs::read_to_string(&path).unwrap().lines().count() - 1;
        if rows >= 3 {
            break;
        }
    }
    monitor.stop();
    monitor.join(Some(Duration::from_secs(10)), false).unwrap();
    child.kill().unwrap();
    child.wait().unwrap();

    assert!(rows >= 3, "only {} rows", rows);
    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert!(lines.next().unwrap().starts_with("#Time\t"));
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 7);
        for value in &fields[1..] {
            assert!(value.parse::<f64>().is_ok(), "not numeric: {:?}", value);
        }
    }
    assert!(tracker.is_empty());
}
