//! # Verdict Wait
//!
//! Timeout-bounded waits that turn "never happened" into outcomes:
//! - [`wait_for_file`]: a file appears
//! - [`wait_for_signal`]: enough lines of a log match an expression, with
//!   fail-fast on error expressions or process death
//! - [`wait_for_socket`]: a TCP port accepts connections
//!
//! Matching is done by the pure [`scan_text`] over the whole file at every
//! poll, after optional [`LineMapper`] transforms.

pub mod encoding;
pub mod mapper;
pub mod scan;
pub mod waiter;

pub use encoding::TextEncoding;
pub use mapper::LineMapper;
pub use scan::{scan_text, LineMatch, ScanResult};
pub use waiter::{
    get_expr_from_file, wait_for_file, wait_for_signal, wait_for_socket, SignalMatches, SignalWait,
    WaitStatus, DEFAULT_SIGNAL_POLL,
};
