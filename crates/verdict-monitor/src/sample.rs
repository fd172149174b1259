//! One monitoring sample and the keys used to pick values out of it.

use chrono::{DateTime, Local};
use std::fmt;

/// A statistic a handler can ask for.
///
/// The display names double as column names in delimited output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorKey {
    /// Local wall-clock time of the sample.
    Time,
    /// Sample counter, starting at 1.
    Sample,
    /// CPU usage as a percentage of one core (may exceed 100).
    CpuCore,
    /// CPU usage as a percentage of the whole machine.
    CpuTotal,
    ResidentMemory,
    VirtualMemory,
    /// Private (non-shared) memory; not available on every platform.
    PrivateMemory,
    Threads,
    /// Open handle count; Windows only.
    KernelHandles,
}

impl MonitorKey {
    /// Columns written when a file handler is not told otherwise.
    pub const DEFAULT_COLUMNS: [MonitorKey; 7] = [
        MonitorKey::Time,
        MonitorKey::Sample,
        MonitorKey::CpuCore,
        MonitorKey::ResidentMemory,
        MonitorKey::VirtualMemory,
        MonitorKey::Threads,
        MonitorKey::KernelHandles,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MonitorKey::Time => "Time",
            MonitorKey::Sample => "Sample",
            MonitorKey::CpuCore => "CPU core %",
            MonitorKey::CpuTotal => "CPU total %",
            MonitorKey::ResidentMemory => "Resident memory kB",
            MonitorKey::VirtualMemory => "Virtual memory kB",
            MonitorKey::PrivateMemory => "Private memory kB",
            MonitorKey::Threads => "Threads",
            MonitorKey::KernelHandles => "Kernel handles",
        }
    }

    /// Column header form of the name: spaces become underscores.
    pub fn column_name(&self) -> String {
        self.name().replace(' ', "_")
    }
}

impl fmt::Display for MonitorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Statistics for one monitored process tree at one instant.
///
/// `None` means the platform cannot provide the value.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSample {
    pub timestamp: DateTime<Local>,
    pub sample: u64,
    pub cpu_core_percent: f64,
    pub cpu_total_percent: f64,
    pub resident_kb: u64,
    pub virtual_kb: u64,
    pub private_kb: Option<u64>,
    pub threads: Option<u64>,
    pub handles: Option<u64>,
}

impl MonitorSample {
    /// Renders the value for `key` as text; unavailable values are `-1`.
    pub fn format_value(&self, key: MonitorKey) -> String {
        match key {
            MonitorKey::Time => self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            MonitorKey::Sample => self.sample.to_string(),
            MonitorKey::CpuCore => format!("{}", self.cpu_core_percent.round() as i64),
            MonitorKey::CpuTotal => format!("{}", self.cpu_total_percent.round() as i64),
            MonitorKey::ResidentMemory => self.resident_kb.to_string(),
            MonitorKey::VirtualMemory => self.virtual_kb.to_string(),
            MonitorKey::PrivateMemory => or_missing(self.private_kb),
            MonitorKey::Threads => or_missing(self.threads),
            MonitorKey::KernelHandles => or_missing(self.handles),
        }
    }
}

fn or_missing(value: Option<u64>) -> String {
    value.map_or_else(|| "-1".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MonitorSample {
        MonitorSample {
            timestamp: Local::now(),
            sample: 3,
            cpu_core_percent: 150.6,
            cpu_total_percent: 37.6,
            resident_kb: 2048,
            virtual_kb: 8192,
            private_kb: None,
            threads: Some(4),
            handles: None,
        }
    }

    #[test]
    fn test_column_names() {
        assert_eq!(MonitorKey::CpuCore.column_name(), "CPU_core_%");
        assert_eq!(MonitorKey::ResidentMemory.column_name(), "Resident_memory_kB");
        assert_eq!(MonitorKey::Time.to_string(), "Time");
    }

    #[test]
    fn test_format_values() {
        let s = sample();
        assert_eq!(s.format_value(MonitorKey::Sample), "3");
        assert_eq!(s.format_value(MonitorKey::CpuCore), "151");
        assert_eq!(s.format_value(MonitorKey::CpuTotal), "38");
        assert_eq!(s.format_value(MonitorKey::ResidentMemory), "2048");
        assert_eq!(s.format_value(MonitorKey::Threads), "4");
        assert_eq!(s.format_value(MonitorKey::KernelHandles), "-1");
        assert_eq!(s.format_value(MonitorKey::PrivateMemory), "-1");
    }

    #[test]
    fn test_time_format() {
        let value = sample().format_value(MonitorKey::Time);
        assert_eq!(value.len(), "2024-01-01 00:00:00".len());
        assert_eq!(&value[4..5], "-");
        assert_eq!(&value[10..11], " ");
    }
}
