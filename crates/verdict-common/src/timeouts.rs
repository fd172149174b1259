//! Default timeouts for every blocking operation.
//!
//! All waits in verdict are bounded. Callers may override per call; when
//! they don't, the owner falls back to these values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_WAIT_FOR_SOCKET: Duration = Duration::from_secs(60);
pub const DEFAULT_WAIT_FOR_FILE: Duration = Duration::from_secs(30);
pub const DEFAULT_WAIT_FOR_SIGNAL: Duration = Duration::from_secs(60);
pub const DEFAULT_WAIT_FOR_PROCESS_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_WAIT_FOR_PROCESS: Duration = Duration::from_secs(600);

/// Timeout table handed to each owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_wait_for_socket", with = "crate::duration_serde")]
    pub wait_for_socket: Duration,

    #[serde(default = "default_wait_for_file", with = "crate::duration_serde")]
    pub wait_for_file: Duration,

    #[serde(default = "default_wait_for_signal", with = "crate::duration_serde")]
    pub wait_for_signal: Duration,

    /// Also the default join timeout for background threads and monitors.
    #[serde(default = "default_wait_for_process_stop", with = "crate::duration_serde")]
    pub wait_for_process_stop: Duration,

    /// Upper bound for foreground processes started without an explicit timeout.
    #[serde(default = "default_wait_for_process", with = "crate::duration_serde")]
    pub wait_for_process: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            wait_for_socket: DEFAULT_WAIT_FOR_SOCKET,
            wait_for_file: DEFAULT_WAIT_FOR_FILE,
            wait_for_signal: DEFAULT_WAIT_FOR_SIGNAL,
            wait_for_process_stop: DEFAULT_WAIT_FOR_PROCESS_STOP,
            wait_for_process: DEFAULT_WAIT_FOR_PROCESS,
        }
    }
}

fn default_wait_for_socket() -> Duration {
    DEFAULT_WAIT_FOR_SOCKET
}

fn default_wait_for_file() -> Duration {
    DEFAULT_WAIT_FOR_FILE
}

fn default_wait_for_signal() -> Duration {
    DEFAULT_WAIT_FOR_SIGNAL
}

fn default_wait_for_process_stop() -> Duration {
    DEFAULT_WAIT_FOR_PROCESS_STOP
}

fn default_wait_for_process() -> Duration {
    DEFAULT_WAIT_FOR_PROCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.wait_for_socket, Duration::from_secs(60));
        assert_eq!(timeouts.wait_for_file, Duration::from_secs(30));
        assert_eq!(timeouts.wait_for_process_stop, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let timeouts: Timeouts = serde_yaml::from_str("wait_for_file: 500ms\n").unwrap();
        assert_eq!(timeouts.wait_for_file, Duration::from_millis(500));
        assert_eq!(timeouts.wait_for_signal, DEFAULT_WAIT_FOR_SIGNAL);
    }
}
