//! Small domain types used across crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether starting a process blocks until it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Block the caller until exit or timeout.
    #[default]
    Foreground,
    /// Return immediately with a live handle.
    Background,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Foreground => write!(f, "foreground"),
            ExecutionMode::Background => write!(f, "background"),
        }
    }
}
