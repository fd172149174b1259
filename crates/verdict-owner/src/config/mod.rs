//! Owner configuration.
//!
//! Usually built in code with [`OwnerConfig::new`], or loaded from YAML:
//!
//! ```yaml
//! output_dir: target/test-output/smoke
//! default_abort_on_error: true
//! stop_grace_period: 5s
//! timeouts:
//!   wait_for_signal: 20s
//! monitor:
//!   interval: 1s
//!   delimiter: ","
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use verdict_common::Timeouts;
use verdict_monitor::{MonitorOptions, DEFAULT_INTERVAL, DEFAULT_SETTLE_DELAY};

pub mod validation;

pub const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Everything an owner needs besides the test itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerConfig {
    /// Where output files are allocated and relative paths are resolved.
    pub output_dir: PathBuf,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub default_abort_on_error: bool,

    #[serde(default)]
    pub default_ignore_exit_status: bool,

    /// Time a process gets to exit after a termination request before it
    /// is killed.
    #[serde(
        default = "default_stop_grace_period",
        with = "verdict_common::duration_serde"
    )]
    pub stop_grace_period: Duration,

    #[serde(default)]
    pub monitor: MonitorDefaults,
}

/// Defaults for monitors started through the owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorDefaults {
    #[serde(default = "default_monitor_interval", with = "verdict_common::duration_serde")]
    pub interval: Duration,

    #[serde(default = "default_settle_delay", with = "verdict_common::duration_serde")]
    pub settle_delay: Duration,

    #[serde(default = "default_include_children")]
    pub include_children: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_processors: Option<usize>,

    /// Column separator for monitor files.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for MonitorDefaults {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            include_children: true,
            num_processors: None,
            delimiter: default_delimiter(),
        }
    }
}

impl MonitorDefaults {
    pub fn options(&self) -> MonitorOptions {
        let mut options = MonitorOptions::default()
            .interval(self.interval)
            .settle_delay(self.settle_delay)
            .include_children(self.include_children);
        options.num_processors = self.num_processors;
        options
    }
}

impl OwnerConfig {
    /// Defaults for everything except the output directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            timeouts: Timeouts::default(),
            default_abort_on_error: false,
            default_ignore_exit_status: false,
            stop_grace_period: DEFAULT_STOP_GRACE_PERIOD,
            monitor: MonitorDefaults::default(),
        }
    }

    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: OwnerConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    pub fn abort_on_error(mut self, abort: bool) -> Self {
        self.default_abort_on_error = abort;
        self
    }

    pub fn stop_grace_period(mut self, grace: Duration) -> Self {
        self.stop_grace_period = grace;
        self
    }
}

fn default_stop_grace_period() -> Duration {
    DEFAULT_STOP_GRACE_PERIOD
}

fn default_monitor_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_settle_delay() -> Duration {
    DEFAULT_SETTLE_DELAY
}

fn default_include_children() -> bool {
    true
}

fn default_delimiter() -> String {
    "\t".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = OwnerConfig::load_from_string("output_dir: /tmp/out\n").unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.timeouts, Timeouts::default());
        assert!(!config.default_abort_on_error);
        assert_eq!(config.stop_grace_period, DEFAULT_STOP_GRACE_PERIOD);
        assert_eq!(config.monitor, MonitorDefaults::default());
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
output_dir: out
default_abort_on_error: true
default_ignore_exit_status: true
stop_grace_period: 500ms
timeouts:
  wait_for_signal: 20s
  wait_for_process: 2m
monitor:
  interval: 1s
  settle_delay: 0s
  include_children: false
  num_processors: 4
  delimiter: ","
"#;
        let config = OwnerConfig::load_from_string(yaml).unwrap();
        assert!(config.default_abort_on_error);
        assert!(config.default_ignore_exit_status);
        assert_eq!(config.stop_grace_period, Duration::from_millis(500));
        assert_eq!(config.timeouts.wait_for_signal, Duration::from_secs(20));
        assert_eq!(config.timeouts.wait_for_process, Duration::from_secs(120));
        assert_eq!(config.timeouts.wait_for_file, Duration::from_secs(30));

        let options = config.monitor.options();
        assert_eq!(options.interval, Duration::from_secs(1));
        assert!(!options.include_children);
        assert_eq!(options.num_processors, Some(4));
        assert_eq!(config.monitor.delimiter, ",");
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(OwnerConfig::load_from_string("output_dir: \"\"\n").is_err());
        assert!(OwnerConfig::load_from_string("output_dir: out\nmonitor:\n  interval: 0s\n").is_err());
        assert!(OwnerConfig::load_from_string("output_dir: out\nstop_grace_period: soon\n").is_err());
        assert!(OwnerConfig::load_from_string("timeouts: {}\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owner.yaml");
        std::fs::write(&path, "output_dir: results\n").unwrap();
        assert_eq!(
            OwnerConfig::load_from_file(&path).unwrap().output_dir,
            PathBuf::from("results")
        );
        assert!(OwnerConfig::load_from_file(dir.path().join("missing.yaml")).is_err());
    }
}
