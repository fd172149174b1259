//! # Verdict Process
//!
//! Cross-platform control of a single supervised OS process:
//! - spawning with an explicit environment and redirected output
//! - graceful stop with escalation to a forced kill of the process group
//! - POSIX signals, bounded waits and stdin writes
//! - a lifecycle state machine whose terminal state is set exactly once
//!
//! Policy (timeouts turning into outcomes, registries, cleanup) lives in
//! the owner crate; this crate only drives the OS.

pub mod check;
pub mod environment;
pub mod handle;
pub mod spec;
pub mod state;
pub mod terminate;

mod stdin;

#[cfg(windows)]
pub mod terminate_windows;

pub use check::process_exists;
pub use environment::{default_environment, resolve_environment, Environment, EnvironmentBuilder};
pub use handle::{ExitInfo, ProcessHandle, FORCE_KILL_TIMEOUT};
pub use spec::ProcessSpec;
pub use state::{ProcessState, ProcessStateMachine, StateTransition};
pub use terminate::{force_kill, kill_group, request_termination, send_signal};
