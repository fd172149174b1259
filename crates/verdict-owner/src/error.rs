//! Errors returned by owner operations.

use thiserror::Error;
use verdict_common::ProcessError;
use verdict_outcome::Abort;

pub type OwnerResult<T> = std::result::Result<T, OwnerError>;

#[derive(Debug, Error)]
pub enum OwnerError {
    /// A failure outcome was recorded with abort-on-error set.
    #[error(transparent)]
    Abort(#[from] Abort),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Common(#[from] verdict_common::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OwnerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The abort, if this error is one.
    pub fn as_abort(&self) -> Option<&Abort> {
        match self {
            OwnerError::Abort(abort) => Some(abort),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for OwnerError {
    fn from(e: anyhow::Error) -> Self {
        Self::Config(format!("{:#}", e))
    }
}
