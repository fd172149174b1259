//! The sampling loop.
//!
//! A [`ProcessMonitor`] owns a [`BackgroundThread`] that waits a short
//! settle delay, works out which pids to watch, then samples them every
//! interval until stopped. Failed queries are logged and skipped so a
//! monitor never fails a test just because a process went away between
//! two samples. A handler error, on the other hand, ends the loop and is
//! reported as `BLOCKED` when the monitor is joined.

use chrono::Local;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use verdict_common::Result;
use verdict_outcome::{Abort, OutcomeTracker};
use verdict_process::{process_exists, ProcessHandle};
use verdict_threads::{BackgroundThread, ThreadContext};

use crate::handler::MonitorHandler;
use crate::provider::{default_stats_provider, StatsProvider};
use crate::sample::MonitorSample;
use crate::tree::descendant_tree;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// How a monitor samples.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub interval: Duration,
    /// Also sum the target's descendants, as found once after the settle delay.
    pub include_children: bool,
    /// Divides CPU usage; `None` reports usage relative to one core.
    pub num_processors: Option<usize>,
    pub settle_delay: Duration,
    /// End the loop on its own once the target has exited.
    pub stop_when_target_exits: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            include_children: true,
            num_processors: None,
            settle_delay: DEFAULT_SETTLE_DELAY,
            stop_when_target_exits: false,
        }
    }
}

impl MonitorOptions {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn include_children(mut self, include: bool) -> Self {
        self.include_children = include;
        self
    }

    pub fn num_processors(mut self, count: usize) -> Self {
        self.num_processors = Some(count);
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn stop_when_target_exits(mut self, stop: bool) -> Self {
        self.stop_when_target_exits = stop;
        self
    }
}

/// What to monitor.
#[derive(Debug, Clone)]
pub enum MonitorTarget {
    Handle(ProcessHandle),
    Pid(u32),
}

impl MonitorTarget {
    pub fn pid(&self) -> u32 {
        match self {
            MonitorTarget::Handle(handle) => handle.pid(),
            MonitorTarget::Pid(pid) => *pid,
        }
    }

    pub fn name(&self) -> String {
        match self {
            MonitorTarget::Handle(handle) => handle.display_name().to_string(),
            MonitorTarget::Pid(pid) => format!("pid{}", pid),
        }
    }

    pub fn alive(&self) -> bool {
        match self {
            MonitorTarget::Handle(handle) => handle.running(),
            MonitorTarget::Pid(pid) => process_exists(*pid).unwrap_or(false),
        }
    }
}

impl From<ProcessHandle> for MonitorTarget {
    fn from(handle: ProcessHandle) -> Self {
        MonitorTarget::Handle(handle)
    }
}

impl From<&ProcessHandle> for MonitorTarget {
    fn from(handle: &ProcessHandle) -> Self {
        MonitorTarget::Handle(handle.clone())
    }
}

/// Handle on a running monitor. Clones refer to the same monitor.
#[derive(Clone)]
pub struct ProcessMonitor {
    name: String,
    pid: u32,
    thread: Arc<BackgroundThread>,
}

impl ProcessMonitor {
    /// Starts monitoring with the platform's default stats provider.
    pub fn start(
        target: impl Into<MonitorTarget>,
        options: MonitorOptions,
        handlers: Vec<Box<dyn MonitorHandler>>,
        tracker: Arc<OutcomeTracker>,
    ) -> Result<Self> {
        Self::start_with_provider(target, options, handlers, default_stats_provider(), tracker)
    }

    pub fn start_with_provider(
        target: impl Into<MonitorTarget>,
        options: MonitorOptions,
        handlers: Vec<Box<dyn MonitorHandler>>,
        provider: Box<dyn StatsProvider>,
        tracker: Arc<OutcomeTracker>,
    ) -> Result<Self> {
        let target = target.into();
        let pid = target.pid();
        let name = format!("ProcessMonitor<{} pid={}>", target.name(), pid);

        info!(
            "Starting {} with interval {:?} for {} handler(s)",
            name,
            options.interval,
            handlers.len()
        );

        let sampler = Sampler {
            target,
            options,
            handlers,
            provider,
        };
        let thread = BackgroundThread::start(name.clone(), tracker, None, move |ctx| sampler.run(ctx))?;

        Ok(Self { name, pid, thread })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// True from start until stop is requested or the loop has ended.
    pub fn running(&self) -> bool {
        self.thread.is_alive() && !self.thread.stop_requested()
    }

    /// Asks the loop to finish; safe to call repeatedly or after it ended.
    pub fn stop(&self) {
        if self.thread.stop_requested() {
            return;
        }
        info!("Stopping {}", self.name);
        self.thread.stop();
    }

    /// Waits for the loop to exit, so that handler files are closed.
    #[track_caller]
    pub fn join(&self, timeout: Option<Duration>, abort_on_error: bool) -> std::result::Result<(), Abort> {
        self.thread.join(timeout, abort_on_error)
    }
}

impl fmt::Debug for ProcessMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessMonitor")
            .field("name", &self.name)
            .field("running", &self.running())
            .finish()
    }
}

impl fmt::Display for ProcessMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// State moved onto the monitor thread.
struct Sampler {
    target: MonitorTarget,
    options: MonitorOptions,
    handlers: Vec<Box<dyn MonitorHandler>>,
    provider: Box<dyn StatsProvider>,
}

impl Sampler {
    fn run(mut self, ctx: ThreadContext) -> anyhow::Result<()> {
        let result = self.sample_until_stopped(&ctx);

        let mut cleanup_error = None;
        for handler in &mut self.handlers {
            if let Err(e) = handler.cleanup() {
                warn!("Monitor handler cleanup failed: {}", e);
                cleanup_error.get_or_insert(e);
            }
        }

        result?;
        match cleanup_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn sample_until_stopped(&mut self, ctx: &ThreadContext) -> anyhow::Result<()> {
        // Give a freshly started process time to create its children
        if ctx.stopping.wait(self.options.settle_delay) {
            return Ok(());
        }

        let pids = self.watched_pids();
        debug!("{} watching pids {:?}", ctx.name, pids);

        let processors = self.options.num_processors.unwrap_or(1).max(1) as f64;
        let cpu_count = thread::available_parallelism().map_or(1, |n| n.get()) as f64;
        let mut sample_number: u64 = 0;

        loop {
            if self.options.stop_when_target_exits && !self.target.alive() {
                info!("{} target has exited; monitor finishing", ctx.name);
                return Ok(());
            }

            match self.provider.query(&pids) {
                Ok(stats) => {
                    sample_number += 1;
                    let sample = MonitorSample {
                        timestamp: Local::now(),
                        sample: sample_number,
                        cpu_core_percent: stats.cpu_percent / processors,
                        cpu_total_percent: stats.cpu_percent / cpu_count,
                        resident_kb: stats.resident_kb,
                        virtual_kb: stats.virtual_kb,
                        private_kb: stats.private_kb,
                        threads: stats.threads,
                        handles: stats.handles,
                    };
                    for handler in &mut self.handlers {
                        handler.on_sample(&sample)?;
                    }
                }
                Err(e) if self.target.alive() => {
                    warn!("{} could not sample: {}", ctx.name, e);
                }
                Err(e) => {
                    debug!("{} could not sample after target exited: {}", ctx.name, e);
                }
            }

            if ctx.stopping.wait(self.options.interval) {
                return Ok(());
            }
        }
    }

    fn watched_pids(&mut self) -> Vec<u32> {
        let root = self.target.pid();
        if !self.options.include_children {
            return vec![root];
        }
        match self.provider.parent_table() {
            Ok(table) => descendant_tree(root, &table),
            Err(e) => {
                warn!("Could not list child processes of {}: {}", root, e);
                vec![root]
            }
        }
    }
}
