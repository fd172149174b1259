//! Sources of per-process statistics.
//!
//! A [`StatsProvider`] answers two questions for the monitor: which
//! processes exist and who their parents are, and what a set of pids is
//! currently using. The default provider is backed by `sysinfo`; a
//! `ps`-based provider covers unix systems `sysinfo` does not support.

use std::collections::HashMap;
use sysinfo::{Pid, ProcessRefreshKind, System};
use tracing::debug;
use verdict_common::{ProcessError, ProcessResult};

/// Summed usage for a group of processes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessStats {
    /// Percentage of one core; can exceed 100 on multi-core machines.
    pub cpu_percent: f64,
    pub resident_kb: u64,
    pub virtual_kb: u64,
    pub private_kb: Option<u64>,
    pub threads: Option<u64>,
    pub handles: Option<u64>,
}

/// Platform facility for reading process statistics.
pub trait StatsProvider: Send {
    /// Every visible process as `(pid, parent pid)`.
    fn parent_table(&mut self) -> ProcessResult<Vec<(u32, u32)>>;

    /// Usage summed over `pids`. The first pid must exist; others that
    /// have exited since the table was read are skipped.
    fn query(&mut self, pids: &[u32]) -> ProcessResult<ProcessStats>;
}

/// Provider backed by a long-lived `sysinfo::System`.
///
/// CPU usage is computed between consecutive refreshes, so the first query
/// for a pid reports 0.
pub struct SysinfoStatsProvider {
    system: System,
}

impl SysinfoStatsProvider {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoStatsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsProvider for SysinfoStatsProvider {
    fn parent_table(&mut self) -> ProcessResult<Vec<(u32, u32)>> {
        self.system.refresh_processes();
        Ok(self
            .system
            .processes()
            .iter()
            .filter_map(|(pid, process)| process.parent().map(|ppid| (pid.as_u32(), ppid.as_u32())))
            .collect())
    }

    fn query(&mut self, pids: &[u32]) -> ProcessResult<ProcessStats> {
        let root = *pids
            .first()
            .ok_or_else(|| ProcessError::monitoring("<none>", "no pids to query"))?;

        let mut stats = ProcessStats::default();
        let mut threads: Option<u64> = None;
        let mut private_kb: Option<u64> = None;
        let mut handles: Option<u64> = None;

        for &pid in pids {
            let sysinfo_pid = Pid::from_u32(pid);
            // Without an explicit refresh kind sysinfo returns zeroed data
            let found = self.system.refresh_process_specifics(
                sysinfo_pid,
                ProcessRefreshKind::new().with_cpu().with_memory(),
            );
            let process = match self.system.process(sysinfo_pid) {
                Some(process) if found => process,
                _ if pid == root => {
                    return Err(ProcessError::monitoring(
                        pid.to_string(),
                        "process not found",
                    ))
                }
                _ => {
                    debug!("Skipping pid {} which has exited", pid);
                    continue;
                }
            };

            stats.cpu_percent += f64::from(process.cpu_usage());
            stats.resident_kb += process.memory() / 1024;
            stats.virtual_kb += process.virtual_memory() / 1024;

            if let Some(counts) = read_status_counts(pid) {
                threads = Some(threads.unwrap_or(0) + counts.threads);
                private_kb = Some(private_kb.unwrap_or(0) + counts.private_kb);
            }
            if let Some(count) = read_handle_count(pid) {
                handles = Some(handles.unwrap_or(0) + count);
            }
        }

        stats.threads = threads;
        stats.private_kb = private_kb;
        stats.handles = handles;
        Ok(stats)
    }
}

/// Counters read from `/proc/<pid>/status`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct StatusCounts {
    pub threads: u64,
    pub private_kb: u64,
}

/// Parses the `Threads` and `RssAnon` lines of a Linux status file.
pub(crate) fn parse_status_counts(content: &str) -> Option<StatusCounts> {
    let fields: HashMap<&str, &str> = content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect();

    let number = |key: &str| -> Option<u64> {
        fields
            .get(key)
            .and_then(|s| s.split_whitespace().next())
            .and_then(|s| s.parse().ok())
    };

    Some(StatusCounts {
        threads: number("Threads")?,
        private_kb: number("RssAnon").unwrap_or(0),
    })
}

#[cfg(target_os = "linux")]
fn read_status_counts(pid: u32) -> Option<StatusCounts> {
    let content = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    parse_status_counts(&content)
}

#[cfg(not(target_os = "linux"))]
fn read_status_counts(_pid: u32) -> Option<StatusCounts> {
    None
}

/// Open kernel handles of one process.
#[cfg(windows)]
fn read_handle_count(pid: u32) -> Option<u64> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{
        GetProcessHandleCount, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    unsafe {
        let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
        let mut count = 0u32;
        let result = GetProcessHandleCount(process, &mut count);
        let _ = CloseHandle(process);
        result.ok().map(|()| u64::from(count))
    }
}

#[cfg(not(windows))]
fn read_handle_count(_pid: u32) -> Option<u64> {
    None
}

/// Provider that shells out to `ps`.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct PsStatsProvider;

#[cfg(unix)]
impl PsStatsProvider {
    pub fn new() -> Self {
        Self
    }

    fn run_ps(args: &[&str]) -> ProcessResult<String> {
        let output = std::process::Command::new("ps")
            .args(args)
            .output()
            .map_err(|e| ProcessError::monitoring("ps", e.to_string()))?;
        // ps exits non-zero when some of the listed pids are gone
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(unix)]
impl StatsProvider for PsStatsProvider {
    fn parent_table(&mut self) -> ProcessResult<Vec<(u32, u32)>> {
        let output = Self::run_ps(&["-e", "-o", "pid=", "-o", "ppid="])?;
        Ok(parse_parent_table(&output))
    }

    fn query(&mut self, pids: &[u32]) -> ProcessResult<ProcessStats> {
        let root = *pids
            .first()
            .ok_or_else(|| ProcessError::monitoring("<none>", "no pids to query"))?;
        let pid_list = pids
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let output = Self::run_ps(&[
            "-o", "pid=", "-o", "pcpu=", "-o", "rss=", "-o", "vsz=", "-p", &pid_list,
        ])?;
        parse_usage(&output, root)
    }
}

/// Parses `pid ppid` lines.
pub(crate) fn parse_parent_table(output: &str) -> Vec<(u32, u32)> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let ppid = fields.next()?.parse().ok()?;
            Some((pid, ppid))
        })
        .collect()
}

/// Sums `pid pcpu rss vsz` lines; fails if `root` is not among them.
pub(crate) fn parse_usage(output: &str, root: u32) -> ProcessResult<ProcessStats> {
    let mut stats = ProcessStats::default();
    let mut seen_root = false;

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let Ok(pid) = fields[0].parse::<u32>() else {
            continue;
        };
        seen_root |= pid == root;
        stats.cpu_percent += fields[1].parse::<f64>().unwrap_or(0.0);
        stats.resident_kb += fields[2].parse::<u64>().unwrap_or(0);
        stats.virtual_kb += fields[3].parse::<u64>().unwrap_or(0);
    }

    if !seen_root {
        return Err(ProcessError::monitoring(root.to_string(), "process not found"));
    }
    Ok(stats)
}

/// The best provider for the current platform.
#[cfg(not(all(unix, not(any(target_os = "linux", target_os = "macos")))))]
pub fn default_stats_provider() -> Box<dyn StatsProvider> {
    Box::new(SysinfoStatsProvider::new())
}

/// The best provider for the current platform.
#[cfg(all(unix, not(any(target_os = "linux", target_os = "macos"))))]
pub fn default_stats_provider() -> Box<dyn StatsProvider> {
    Box::new(PsStatsProvider::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_counts() {
        let content = "Name:\tsleep\nPid:\t42\nRssAnon:\t    132 kB\nThreads:\t3\n";
        let counts = parse_status_counts(content).unwrap();
        assert_eq!(counts.threads, 3);
        assert_eq!(counts.private_kb, 132);

        assert!(parse_status_counts("Name:\tkworker\n").is_none());
    }

    #[test]
    fn test_parse_parent_table() {
        let output = "    1     0\n  200     1\n  201   200\ngarbage\n";
        assert_eq!(parse_parent_table(output), vec![(1, 0), (200, 1), (201, 200)]);
    }

    #[test]
    fn test_parse_usage_sums_and_requires_root() {
        let output = "  200  12.5  1000  5000\n  201   7.5   500  2500\n";
        let stats = parse_usage(output, 200).unwrap();
        assert_eq!(stats.cpu_percent, 20.0);
        assert_eq!(stats.resident_kb, 1500);
        assert_eq!(stats.virtual_kb, 7500);
        assert!(stats.threads.is_none());

        assert!(parse_usage(output, 999).is_err());
        assert!(parse_usage("", 200).is_err());
    }

    #[test]
    fn test_sysinfo_reports_current_process() {
        let mut provider = SysinfoStatsProvider::new();
        let me = std::process::id();
        let stats = provider.query(&[me]).unwrap();
        assert!(stats.resident_kb > 0);

        let table = provider.parent_table().unwrap();
        assert!(table.iter().any(|(pid, _)| *pid == me));
    }

    #[cfg(windows)]
    #[test]
    fn test_sysinfo_reports_handle_count_on_windows() {
        let mut provider = SysinfoStatsProvider::new();
        let stats = provider.query(&[std::process::id()]).unwrap();
        assert!(stats.handles.unwrap_or(0) > 0);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_handle_count_unavailable_off_windows() {
        assert_eq!(read_handle_count(std::process::id()), None);
    }

    #[test]
    fn test_sysinfo_missing_root_fails() {
        let mut provider = SysinfoStatsProvider::new();
        assert!(provider.query(&[]).is_err());
        assert!(provider.query(&[999_999_999]).is_err());
    }
}
