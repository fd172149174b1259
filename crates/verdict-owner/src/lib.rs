//! # Verdict Owner
//!
//! The object a test talks to. A [`ProcessOwner`] starts processes,
//! monitors and background threads, waits on files, logs and sockets, and
//! folds every problem it sees into one outcome tracker so the test ends
//! with a single verdict.
//!
//! This crate provides:
//! - [`ProcessOwner`] with registries and LIFO cleanup
//! - [`OwnerConfig`] loaded from code or YAML
//! - [`OwnerError`], whose `Abort` variant ends a test early through `?`
//!
//! ```no_run
//! use verdict_owner::{OwnerConfig, OwnerResult, ProcessOwner, ProcessSpec, SignalWait};
//!
//! fn run() -> OwnerResult<()> {
//!     let mut owner = ProcessOwner::new(OwnerConfig::new("target/output/smoke"))?;
//!     let server = owner.start_process(
//!         ProcessSpec::new("/usr/bin/my-server").display_name("server").background(),
//!     )?;
//!     owner.wait_for_signal("server.out", SignalWait::new("Listening")?.process(&server))?;
//!     owner.stop_process(&server)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod owner;

pub use config::{MonitorDefaults, OwnerConfig};
pub use error::{OwnerError, OwnerResult};
pub use owner::ProcessOwner;

// The types a test needs alongside the owner
pub use verdict_common::{init_logging, Condition, ExecutionMode, Timeouts};
pub use verdict_monitor::{MonitorHandler, MonitorKey, MonitorOptions, MonitorSample, ProcessMonitor};
pub use verdict_outcome::{Abort, Outcome, OutcomeKind};
pub use verdict_process::{EnvironmentBuilder, ProcessHandle, ProcessSpec, ProcessState};
pub use verdict_threads::{BackgroundThread, ThreadContext};
pub use verdict_wait::{LineMapper, LineMatch, SignalMatches, SignalWait, TextEncoding, WaitStatus};
