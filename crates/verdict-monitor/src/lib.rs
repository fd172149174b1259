//! # Verdict Monitor
//!
//! Periodic CPU and memory sampling of a process (and optionally its
//! children) on a background thread, with samples fanned out to
//! pluggable [`MonitorHandler`]s.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use verdict_monitor::{DelimitedFileHandler, MonitorOptions, MonitorTarget, ProcessMonitor};
//! use verdict_outcome::OutcomeTracker;
//!
//! # fn main() -> verdict_common::Result<()> {
//! let tracker = Arc::new(OutcomeTracker::new());
//! let file = DelimitedFileHandler::new("monitor-server.tsv")?;
//! let monitor = ProcessMonitor::start(
//!     MonitorTarget::Pid(4242),
//!     MonitorOptions::default().interval(Duration::from_secs(1)),
//!     vec![Box::new(file)],
//!     tracker,
//! )?;
//! monitor.stop();
//! # Ok(())
//! # }
//! ```

pub mod handler;
pub mod monitor;
pub mod provider;
pub mod sample;
pub mod tree;

pub use handler::{DelimitedFileHandler, MemoryHandler, MonitorHandler};
pub use monitor::{MonitorOptions, MonitorTarget, ProcessMonitor, DEFAULT_INTERVAL, DEFAULT_SETTLE_DELAY};
#[cfg(unix)]
pub use provider::PsStatsProvider;
pub use provider::{default_stats_provider, ProcessStats, StatsProvider, SysinfoStatsProvider};
pub use sample::{MonitorKey, MonitorSample};
pub use tree::descendant_tree;
