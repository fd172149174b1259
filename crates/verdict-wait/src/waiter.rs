//! Bounded polling waits.
//!
//! Every wait has a deadline. Reaching it records `TIMEDOUT` on the tracker;
//! detecting that the awaited thing can no longer happen records `BLOCKED`
//! straight away. Both return `Err(Abort)` only when the caller asked for
//! abort-on-error, so the usual shape is `wait_for_...(...)?;`.

use regex::Regex;
use std::fs;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use verdict_common::{timeouts::DEFAULT_WAIT_FOR_SIGNAL, Condition, Error, Result};
use verdict_outcome::{Abort, OutcomeKind, OutcomeTracker};
use verdict_process::ProcessHandle;

use crate::encoding::TextEncoding;
use crate::mapper::{compile, LineMapper};
use crate::scan::{scan_text, LineMatch};

pub const FILE_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_SIGNAL_POLL: Duration = Duration::from_millis(250);
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(100);

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Satisfied,
    TimedOut,
    /// Given up before the deadline (error expression seen, process died).
    FailedFast,
}

impl WaitStatus {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitStatus::Satisfied)
    }
}

/// Parameters of a log-signal wait.
#[derive(Debug, Clone)]
pub struct SignalWait {
    expr: Regex,
    condition: Condition,
    timeout: Option<Duration>,
    poll: Duration,
    ignores: Vec<Regex>,
    mappers: Vec<LineMapper>,
    encoding: TextEncoding,
    error_exprs: Vec<Regex>,
    process: Option<ProcessHandle>,
    abort_on_error: Option<bool>,
}

impl SignalWait {
    /// Waits for at least one line matching `expr`.
    pub fn new(expr: &str) -> Result<Self> {
        if expr.is_empty() {
            return Err(Error::validation("Signal expression must not be empty"));
        }
        Ok(Self {
            expr: compile(expr)?,
            condition: Condition::default(),
            timeout: None,
            poll: DEFAULT_SIGNAL_POLL,
            ignores: Vec::new(),
            mappers: Vec::new(),
            encoding: TextEncoding::default(),
            error_exprs: Vec::new(),
            process: None,
            abort_on_error: None,
        })
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fills in the timeout when the caller left it unset.
    pub fn timeout_or(mut self, default: Duration) -> Self {
        self.timeout.get_or_insert(default);
        self
    }

    pub fn poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Lines containing any of these are skipped entirely.
    pub fn ignores<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        for pattern in patterns {
            self.ignores.push(compile(pattern.as_ref())?);
        }
        Ok(self)
    }

    pub fn mapper(mut self, mapper: LineMapper) -> Self {
        self.mappers.push(mapper);
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Fail fast when any of these shows up on a non-ignored line.
    pub fn error_exprs<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        for pattern in patterns {
            self.error_exprs.push(compile(pattern.as_ref())?);
        }
        Ok(self)
    }

    /// Fail fast if this process exits before the condition holds.
    pub fn process(mut self, process: &ProcessHandle) -> Self {
        self.process = Some(process.clone());
        self
    }

    pub fn abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = Some(abort);
        self
    }

    /// Fills in abort-on-error when the caller left it unset.
    pub fn abort_on_error_or(mut self, default: bool) -> Self {
        self.abort_on_error.get_or_insert(default);
        self
    }

    pub fn expr(&self) -> &str {
        self.expr.as_str()
    }

    /// Effective timeout; the signal default when unset.
    pub fn get_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_WAIT_FOR_SIGNAL)
    }

    pub fn get_condition(&self) -> Condition {
        self.condition
    }
}

/// Result of [`wait_for_signal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMatches {
    pub status: WaitStatus,
    /// Matches from the last scan, possibly empty.
    pub matches: Vec<LineMatch>,
}

/// Waits until `path` exists.
#[track_caller]
pub fn wait_for_file(
    tracker: &OutcomeTracker,
    path: &Path,
    timeout: Duration,
    abort_on_error: bool,
) -> std::result::Result<WaitStatus, Abort> {
    debug!("Performing wait for file creation: {}", path.display());
    let started = Instant::now();

    loop {
        if path.exists() {
            debug!("Wait for file {} completed successfully", path.display());
            return Ok(WaitStatus::Satisfied);
        }
        if started.elapsed() >= timeout {
            tracker.add_outcome(
                OutcomeKind::TimedOut,
                format!(
                    "Timed out waiting for creation of file {} after {} secs",
                    file_name(path),
                    started.elapsed().as_secs()
                ),
                abort_on_error,
                false,
            )?;
            return Ok(WaitStatus::TimedOut);
        }
        thread::sleep(FILE_POLL_INTERVAL);
    }
}

/// Waits until enough lines of `path` match the signal expression.
///
/// The whole file is re-read and re-scanned at every poll, so mappers and
/// ignores always see the complete content.
#[track_caller]
pub fn wait_for_signal(
    tracker: &OutcomeTracker,
    path: &Path,
    wait: &SignalWait,
) -> std::result::Result<SignalMatches, Abort> {
    let abort_on_error = wait.abort_on_error.unwrap_or(false);
    let timeout = wait.get_timeout();
    let description = format!(
        "Wait for signal \"{}\" {} in {}",
        wait.expr.as_str(),
        wait.condition,
        file_name(path)
    );
    debug!("Performing {} with ignores {:?}", description, wait.ignores);

    let started = Instant::now();
    let mut matches = Vec::new();

    loop {
        let exists = match fs::read(path) {
            Ok(bytes) => {
                let text = wait.encoding.decode(&bytes);
                let scan = scan_text(&text, &wait.mappers, &wait.ignores, &wait.expr, &wait.error_exprs);
                matches = scan.matches;

                if let Some(error) = scan.error_line {
                    tracker.add_outcome(
                        OutcomeKind::Blocked,
                        format!("\"{}\" found during {}", error, description),
                        abort_on_error,
                        false,
                    )?;
                    return Ok(SignalMatches {
                        status: WaitStatus::FailedFast,
                        matches,
                    });
                }
                true
            }
            Err(_) => {
                matches.clear();
                false
            }
        };

        if wait.condition.evaluate(matches.len() as i64) {
            if started.elapsed() > Duration::from_secs(10) {
                info!(
                    "{} completed successfully after {:.1} secs",
                    description,
                    started.elapsed().as_secs_f64()
                );
            } else {
                info!("{} completed successfully", description);
            }
            return Ok(SignalMatches {
                status: WaitStatus::Satisfied,
                matches,
            });
        }

        if started.elapsed() >= timeout {
            let detail = if exists {
                format!("with {} matches", matches.len())
            } else {
                "file does not exist".to_string()
            };
            tracker.add_outcome(
                OutcomeKind::TimedOut,
                format!(
                    "{} timed out after {} secs, {}",
                    description,
                    timeout.as_secs(),
                    detail
                ),
                abort_on_error,
                false,
            )?;
            return Ok(SignalMatches {
                status: WaitStatus::TimedOut,
                matches,
            });
        }

        if let Some(process) = &wait.process {
            if !process.running() {
                tracker.add_outcome(
                    OutcomeKind::Blocked,
                    format!("{} aborted due to process {} termination", description, process),
                    abort_on_error,
                    false,
                )?;
                return Ok(SignalMatches {
                    status: WaitStatus::FailedFast,
                    matches,
                });
            }
        }

        thread::sleep(wait.poll);
    }
}

/// Waits until a TCP connection to `addr` succeeds.
#[track_caller]
pub fn wait_for_socket(
    tracker: &OutcomeTracker,
    addr: impl ToSocketAddrs,
    timeout: Duration,
    process: Option<&ProcessHandle>,
    abort_on_error: bool,
) -> std::result::Result<WaitStatus, Abort> {
    let addrs: Vec<SocketAddr> = match addr.to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            warn!("Cannot resolve socket address: {}", e);
            Vec::new()
        }
    };
    debug!("Performing wait for socket creation {:?}", addrs);
    let started = Instant::now();

    loop {
        if addrs
            .iter()
            .any(|a| TcpStream::connect_timeout(a, CONNECT_ATTEMPT_TIMEOUT).is_ok())
        {
            debug!("Wait for socket creation completed successfully");
            if started.elapsed() > Duration::from_secs(10) {
                info!(
                    "Wait for socket creation completed after {} secs",
                    started.elapsed().as_secs()
                );
            }
            return Ok(WaitStatus::Satisfied);
        }

        if let Some(process) = process {
            if !process.running() {
                tracker.add_outcome(
                    OutcomeKind::Blocked,
                    format!(
                        "Waiting for socket connection aborted due to unexpected process {} termination",
                        process
                    ),
                    abort_on_error,
                    false,
                )?;
                return Ok(WaitStatus::FailedFast);
            }
        }

        if started.elapsed() >= timeout {
            tracker.add_outcome(
                OutcomeKind::TimedOut,
                format!(
                    "Timed out waiting for creation of socket after {} secs",
                    started.elapsed().as_secs()
                ),
                abort_on_error,
                false,
            )?;
            return Ok(WaitStatus::TimedOut);
        }
        thread::sleep(SOCKET_POLL_INTERVAL);
    }
}

/// First line of `path` matching `expr`.
///
/// `Ok(None)` when nothing matches; an unreadable file or a bad pattern is
/// an error.
pub fn get_expr_from_file(path: &Path, expr: &str, encoding: TextEncoding) -> Result<Option<LineMatch>> {
    let regex = compile(expr)?;
    let bytes = fs::read(path).map_err(|e| {
        Error::from(e).context(format!("Reading {}", path.display()))
    })?;
    let text = encoding.decode(&bytes);
    Ok(scan_text(&text, &[], &[], &regex, &[]).matches.into_iter().next())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
