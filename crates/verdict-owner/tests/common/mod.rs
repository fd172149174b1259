//! Shared fixtures for owner integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use verdict_owner::{OwnerConfig, ProcessOwner, ProcessSpec};

/// An owner writing into its own temporary directory.
pub struct TestOwner {
    pub owner: ProcessOwner,
    // Dropped after the owner so cleanup can still write there
    _dir: TempDir,
}

impl TestOwner {
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    pub fn with_config(adjust: impl FnOnce(OwnerConfig) -> OwnerConfig) -> Self {
        let _ = verdict_owner::init_logging(true);
        let dir = tempfile::tempdir().expect("temp dir");
        let config = adjust(
            OwnerConfig::new(dir.path().join("output")).stop_grace_period(Duration::from_secs(2)),
        );
        let owner = ProcessOwner::new(config).expect("owner");
        Self { owner, _dir: dir }
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.owner.output_dir().join(name)
    }
}

/// A `/bin/sh -c` process spec.
pub fn sh(script: &str) -> ProcessSpec {
    ProcessSpec::new("/bin/sh").args(["-c", script])
}

/// Members of process group `pgid` that have neither exited nor become
/// zombies.
#[cfg(target_os = "linux")]
pub fn live_group_members(pgid: u32) -> usize {
    let pgid = pgid.to_string();
    std::fs::read_dir("/proc")
        .expect("procfs")
        .filter_map(|entry| std::fs::read_to_string(entry.ok()?.path().join("stat")).ok())
        .filter(|stat| {
            // After the parenthesised command: state ppid pgrp ...
            let rest = stat.rsplit_once(')').map(|(_, r)| r).unwrap_or("");
            let fields: Vec<&str> = rest.split_whitespace().collect();
            fields.len() > 2 && fields[0] != "Z" && fields[2] == pgid
        })
        .count()
}

#[cfg(target_os = "linux")]
pub fn wait_for_empty_group_within(pgid: u32, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if live_group_members(pgid) == 0 {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[cfg(target_os = "linux")]
pub fn wait_for_empty_group(pgid: u32) -> bool {
    wait_for_empty_group_within(pgid, Duration::from_secs(5))
}
