//! Error types shared by the verdict crates.
//!
//! Two families live here:
//! - [`Error`] for general failures (validation, I/O, bad input).
//! - [`ProcessError`] for anything that goes wrong while driving an OS process.
//!
//! Neither of these is a test *outcome*. Outcomes are recorded into an
//! outcome tracker; errors are returned to the caller, who decides what to do.
//!
//! ```
//! use verdict_common::{Error, Result};
//!
//! fn parse_count(s: &str) -> Result<u32> {
//!     s.parse().map_err(|_| Error::validation(format!("not a count: {}", s)))
//! }
//!
//! assert!(parse_count("3").is_ok());
//! assert!(parse_count("three").is_err());
//! ```

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures that are not tied to one process.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad user input: a condition string, a regex, an empty name.
    #[error("{message}")]
    Validation { message: String },

    /// A broken invariant inside the framework.
    #[error("unexpected failure: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{message}: {source}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Prefixes the error with what was being attempted.
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }
}

/// `context` on results, mirroring `anyhow::Context` for [`Error`].
pub trait ResultExt<T> {
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(message))
    }
}

// ==============================================================================
// Process errors
// ==============================================================================

/// Something went wrong driving one OS process.
///
/// `id` names the process: its display name, or the pid when only that is
/// known. None of these is an outcome; the owner decides whether one is
/// recorded.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error("no such process {id}")]
    NotFound { id: String },

    #[error("cannot start {id}: {reason}")]
    SpawnFailed { id: String, reason: String },

    #[error("cannot stop {id}: {reason}")]
    StopFailed { id: String, reason: String },

    #[error("cannot signal {id}: {reason}")]
    SignalFailed { id: String, reason: String },

    #[error("cannot signal {id}: signals are not supported on this platform")]
    SignalsUnsupported { id: String },

    #[error("cannot wait for {id}: {reason}")]
    WaitFailed { id: String, reason: String },

    #[error("cannot write to stdin of {id}: {reason}")]
    WriteFailed { id: String, reason: String },

    #[error("{id} cannot move from {actual} to {requested}")]
    InvalidState {
        id: String,
        requested: String,
        actual: String,
    },

    #[error("cannot sample {id}: {reason}")]
    MonitoringError { id: String, reason: String },

    #[error("cannot check {id}: {reason}")]
    CheckFailed { id: String, reason: String },
}

macro_rules! reason_ctor {
    ($($fn_name:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $fn_name(id: impl Into<String>, reason: impl Into<String>) -> Self {
                Self::$variant { id: id.into(), reason: reason.into() }
            }
        )*
    };
}

impl ProcessError {
    reason_ctor! {
        spawn_failed => SpawnFailed,
        stop_failed => StopFailed,
        signal_failed => SignalFailed,
        wait_failed => WaitFailed,
        write_failed => WriteFailed,
        monitoring => MonitoringError,
        check_failed => CheckFailed,
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn signals_unsupported(id: impl Into<String>) -> Self {
        Self::SignalsUnsupported { id: id.into() }
    }

    pub fn invalid_state(id: impl Into<String>, requested: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            id: id.into(),
            requested: requested.into(),
            actual: actual.into(),
        }
    }
}

pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain() {
        let result: Result<()> = Err(Error::validation("invalid condition \"=>2\""));
        let err = result.context("Parsing wait condition").unwrap_err();
        assert_eq!(err.to_string(), "Parsing wait condition: invalid condition \"=>2\"");
    }

    #[test]
    fn test_io_context() {
        let err = std::fs::File::open("/definitely/not/here/verdict.txt")
            .context("Opening monitor file")
            .unwrap_err();
        match err {
            Error::WithContext { source, .. } => assert!(matches!(*source, Error::Io(_))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_process_error_messages() {
        let error = ProcessError::spawn_failed("server", "executable not found");
        assert!(matches!(error, ProcessError::SpawnFailed { .. }));
        assert_eq!(error.to_string(), "cannot start server: executable not found");

        let error = ProcessError::invalid_state("server", "Running", "Killed");
        assert_eq!(error.to_string(), "server cannot move from Killed to Running");

        let error = ProcessError::signals_unsupported("server");
        assert!(error.to_string().contains("not supported"));
    }
}
