//! The per-test owner.
//!
//! A [`ProcessOwner`] starts processes, monitors and background threads on
//! behalf of one test, records everything that goes wrong into a single
//! [`OutcomeTracker`], and tears it all down again in [`cleanup`], which
//! also runs from `Drop`.
//!
//! Teardown order:
//! 1. monitors are stopped and joined so their files are closed
//! 2. background threads are stopped, then joined
//! 3. cleanup functions run, most recently added first
//! 4. processes still running are stopped, in the order they were started,
//!    and leftover members of exited processes' groups are killed
//!
//! [`cleanup`]: ProcessOwner::cleanup

use std::collections::HashMap;
use std::fs;
use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use verdict_common::{Condition, ExecutionMode, ProcessError};
use verdict_monitor::{
    DelimitedFileHandler, MonitorHandler, MonitorKey, MonitorOptions, MonitorTarget,
    ProcessMonitor,
};
use verdict_outcome::{Abort, Outcome, OutcomeKind, OutcomeTracker};
use verdict_process::{ProcessHandle, ProcessSpec};
use verdict_threads::{BackgroundThread, ThreadContext, ThreadRegistry};
use verdict_wait::{LineMatch, SignalMatches, SignalWait, TextEncoding, WaitStatus};

use crate::config::OwnerConfig;
use crate::error::OwnerResult;

type CleanupFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Owns everything one test starts.
pub struct ProcessOwner {
    config: OwnerConfig,
    tracker: Arc<OutcomeTracker>,
    processes: Vec<ProcessHandle>,
    instance_counts: HashMap<String, usize>,
    unique_keys: HashMap<String, usize>,
    monitors: Vec<ProcessMonitor>,
    threads: ThreadRegistry,
    cleanup_functions: Vec<CleanupFn>,
    cleaned_up: bool,
}

impl ProcessOwner {
    /// Validates `config` and creates the output directory.
    pub fn new(config: OwnerConfig) -> OwnerResult<Self> {
        config.validate()?;
        fs::create_dir_all(&config.output_dir)?;

        let tracker = Arc::new(OutcomeTracker::new());
        let threads = ThreadRegistry::new(Arc::clone(&tracker), config.timeouts.wait_for_process_stop);
        debug!("Created owner for {}", config.output_dir.display());

        Ok(Self {
            config,
            tracker,
            processes: Vec::new(),
            instance_counts: HashMap::new(),
            unique_keys: HashMap::new(),
            monitors: Vec::new(),
            threads,
            cleanup_functions: Vec::new(),
            cleaned_up: false,
        })
    }

    pub fn config(&self) -> &OwnerConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// The shared tracker, for code that records outcomes off the owner.
    pub fn tracker(&self) -> Arc<OutcomeTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn processes(&self) -> &[ProcessHandle] {
        &self.processes
    }

    pub fn monitors(&self) -> &[ProcessMonitor] {
        &self.monitors
    }

    pub fn threads(&self) -> &[Arc<BackgroundThread>] {
        self.threads.threads()
    }

    /// Resolves a relative path against the output directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.output_dir.join(path)
        }
    }

    /// Output file pair for `key` that no earlier call has returned:
    /// `key.out`/`key.err`, then `key.1.out`/`key.1.err`, and so on.
    pub fn allocate_unique_std_out_err(&mut self, key: &str) -> (PathBuf, PathBuf) {
        let count = self.unique_keys.entry(key.to_string()).or_insert(0);
        let base = if *count == 0 {
            key.to_string()
        } else {
            format!("{}.{}", key, count)
        };
        *count += 1;

        (
            self.config.output_dir.join(format!("{}.out", base)),
            self.config.output_dir.join(format!("{}.err", base)),
        )
    }

    /// How many processes have been started with this display name.
    pub fn instance_count(&self, display_name: &str) -> usize {
        self.instance_counts.get(display_name).copied().unwrap_or(0)
    }

    // ==========================================================================
    // Processes
    // ==========================================================================

    /// Starts a process and registers it for cleanup.
    ///
    /// Unset options come from the owner's configuration. Without output
    /// paths, unique ones are allocated from the display name (or command
    /// name). Relative paths are taken from the output directory, which is
    /// also the default working directory.
    ///
    /// Foreground processes are waited for: a timeout stops the process and
    /// records `TIMEDOUT`; an unexpected exit status records `BLOCKED`, or
    /// `DUMPEDCORE` when a core was dumped. A process that cannot be
    /// started at all is an error, not an outcome.
    #[track_caller]
    pub fn start_process(&mut self, mut spec: ProcessSpec) -> OwnerResult<ProcessHandle> {
        let abort_on_error = spec.abort_on_error.unwrap_or(self.config.default_abort_on_error);
        let ignore_exit_status = spec
            .ignore_exit_status
            .unwrap_or(self.config.default_ignore_exit_status);

        spec.working_dir = Some(match spec.working_dir.take() {
            Some(dir) => self.resolve_path(dir),
            None => self.config.output_dir.clone(),
        });
        if spec.stdout.is_none() && spec.stderr.is_none() {
            let key = spec.display_name.clone().unwrap_or_else(|| command_stem(&spec.command));
            let (stdout, stderr) = self.allocate_unique_std_out_err(&key);
            spec.stdout = Some(stdout);
            spec.stderr = Some(stderr);
        } else {
            spec.stdout = spec.stdout.take().map(|p| self.resolve_path(p));
            spec.stderr = spec.stderr.take().map(|p| self.resolve_path(p));
        }

        let started = Instant::now();
        let handle = ProcessHandle::spawn(&spec)?;
        self.processes.push(handle.clone());
        *self
            .instance_counts
            .entry(handle.display_name().to_string())
            .or_insert(0) += 1;

        if spec.mode == ExecutionMode::Background {
            return Ok(handle);
        }

        let timeout = spec.timeout.unwrap_or(self.config.timeouts.wait_for_process);
        if !handle.wait(timeout)? {
            warn!("Process {} timed out after {} seconds, stopping it", handle, timeout.as_secs());
            if let Err(e) = handle.stop(self.config.stop_grace_period) {
                warn!("{}", e);
            }
            self.tracker.add_outcome(
                OutcomeKind::TimedOut,
                format!("{} timed out after {} seconds", handle, timeout.as_secs()),
                abort_on_error,
                false,
            )?;
            return Ok(handle);
        }

        let exit = handle
            .exit_info()
            .ok_or_else(|| ProcessError::wait_failed(handle.display_name(), "exit status unavailable"))?;
        let expected = spec.expected_exit_status;
        let correct = expected.evaluate(i64::from(exit.code));

        let elapsed = started.elapsed().as_secs();
        let duration = if elapsed > 0 {
            format!(", duration {} secs", elapsed)
        } else {
            String::new()
        };
        if correct {
            info!("Executed {}, exit status {}{}", handle, exit.code, duration);
        } else {
            warn!("Executed {}, exit status {}{}", handle, exit.code, duration);
        }

        if !correct && !ignore_exit_status {
            let kind = if exit.core_dumped {
                OutcomeKind::DumpedCore
            } else {
                OutcomeKind::Blocked
            };
            let reason = if expected == Condition::exactly(0) {
                format!("{} returned non-zero exit code {}", handle, exit.code)
            } else {
                format!("{} returned exit code {} (expected {})", handle, exit.code, expected)
            };
            self.tracker.add_outcome(kind, reason, abort_on_error, false)?;
        }

        Ok(handle)
    }

    /// Stops a process; a process that will not die records `BLOCKED`.
    #[track_caller]
    pub fn stop_process(&self, handle: &ProcessHandle) -> OwnerResult<()> {
        if let Err(e) = handle.stop(self.config.stop_grace_period) {
            self.tracker.add_outcome(
                OutcomeKind::Blocked,
                format!("Could not stop process {}: {}", handle, e),
                self.config.default_abort_on_error,
                false,
            )?;
        }
        Ok(())
    }

    /// Sends a POSIX signal; an error on platforms without signals.
    pub fn signal_process(&self, handle: &ProcessHandle, signal: i32) -> OwnerResult<()> {
        handle.signal(signal)?;
        Ok(())
    }

    /// Waits for a process to exit. A timeout records `TIMEDOUT` and leaves
    /// the process running. Returns whether it exited.
    #[track_caller]
    pub fn wait_process(&self, handle: &ProcessHandle, timeout: Option<Duration>) -> OwnerResult<bool> {
        let timeout = timeout.unwrap_or(self.config.timeouts.wait_for_process);
        debug!("Waiting up to {} secs for process {}", timeout.as_secs(), handle);

        if handle.wait(timeout)? {
            debug!("Process {} exited with status {:?}", handle, handle.exit_status());
            return Ok(true);
        }
        self.tracker.add_outcome(
            OutcomeKind::TimedOut,
            format!("Timed out waiting for process {} after {} secs", handle, timeout.as_secs()),
            self.config.default_abort_on_error,
            false,
        )?;
        Ok(false)
    }

    /// Writes to a running process's stdin; `false` (and a warning) otherwise.
    pub fn write_process(&self, handle: &ProcessHandle, data: impl AsRef<[u8]>, add_new_line: bool) -> bool {
        handle.write(data.as_ref(), add_new_line)
    }

    // ==========================================================================
    // Monitors
    // ==========================================================================

    /// Monitors a process into a delimited file using the configured
    /// defaults. The file defaults to `monitor-<name>.tsv` (`.csv` with a
    /// comma delimiter) in the output directory.
    pub fn start_process_monitor(
        &mut self,
        process: &ProcessHandle,
        file: Option<&Path>,
    ) -> OwnerResult<ProcessMonitor> {
        let delimiter = self.config.monitor.delimiter.clone();
        let path = match file {
            Some(file) => self.resolve_path(file),
            None => {
                let extension = if delimiter == "," { "csv" } else { "tsv" };
                self.config.output_dir.join(format!(
                    "monitor-{}.{}",
                    sanitize_file_stem(process.display_name()),
                    extension
                ))
            }
        };

        let handler = DelimitedFileHandler::with_options(&path, delimiter, &MonitorKey::DEFAULT_COLUMNS)?;
        info!("Monitoring {} into {}", process, path.display());
        self.start_monitor(process, self.config.monitor.options(), vec![Box::new(handler)])
    }

    /// Starts a monitor with explicit options and handlers.
    pub fn start_monitor(
        &mut self,
        target: impl Into<MonitorTarget>,
        options: MonitorOptions,
        handlers: Vec<Box<dyn MonitorHandler>>,
    ) -> OwnerResult<ProcessMonitor> {
        let monitor = ProcessMonitor::start(target, options, handlers, Arc::clone(&self.tracker))?;
        self.monitors.push(monitor.clone());
        Ok(monitor)
    }

    /// Stops a monitor and waits for its files to be closed.
    #[track_caller]
    pub fn stop_process_monitor(&self, monitor: &ProcessMonitor) -> OwnerResult<()> {
        monitor.stop();
        monitor.join(Some(self.config.timeouts.wait_for_process_stop), false)?;
        Ok(())
    }

    // ==========================================================================
    // Background threads
    // ==========================================================================

    /// Starts a background thread that is stopped and joined at cleanup.
    pub fn start_background_thread<F>(
        &mut self,
        name: impl Into<String>,
        target: F,
    ) -> OwnerResult<Arc<BackgroundThread>>
    where
        F: FnOnce(ThreadContext) -> anyhow::Result<()> + Send + 'static,
    {
        Ok(self.threads.start(name, target)?)
    }

    /// Joins a thread, using the owner's abort default.
    #[track_caller]
    pub fn join_background_thread(
        &self,
        thread: &BackgroundThread,
        timeout: Option<Duration>,
    ) -> OwnerResult<()> {
        thread.join(timeout, self.config.default_abort_on_error)?;
        Ok(())
    }

    // ==========================================================================
    // Waits
    // ==========================================================================

    #[track_caller]
    pub fn wait_for_file(&self, path: impl AsRef<Path>, timeout: Option<Duration>) -> OwnerResult<WaitStatus> {
        let path = self.resolve_path(path);
        Ok(verdict_wait::wait_for_file(
            &self.tracker,
            &path,
            timeout.unwrap_or(self.config.timeouts.wait_for_file),
            self.config.default_abort_on_error,
        )?)
    }

    #[track_caller]
    pub fn wait_for_signal(&self, path: impl AsRef<Path>, wait: SignalWait) -> OwnerResult<SignalMatches> {
        let path = self.resolve_path(path);
        let wait = wait
            .timeout_or(self.config.timeouts.wait_for_signal)
            .abort_on_error_or(self.config.default_abort_on_error);
        Ok(verdict_wait::wait_for_signal(&self.tracker, &path, &wait)?)
    }

    #[track_caller]
    pub fn wait_for_socket(
        &self,
        addr: impl ToSocketAddrs,
        timeout: Option<Duration>,
        process: Option<&ProcessHandle>,
    ) -> OwnerResult<WaitStatus> {
        Ok(verdict_wait::wait_for_socket(
            &self.tracker,
            addr,
            timeout.unwrap_or(self.config.timeouts.wait_for_socket),
            process,
            self.config.default_abort_on_error,
        )?)
    }

    /// First line of a file (relative to the output directory) matching `expr`.
    pub fn get_expr_from_file(&self, path: impl AsRef<Path>, expr: &str) -> OwnerResult<Option<LineMatch>> {
        let path = self.resolve_path(path);
        Ok(verdict_wait::get_expr_from_file(&path, expr, TextEncoding::default())?)
    }

    // ==========================================================================
    // Outcomes
    // ==========================================================================

    /// Records an outcome. `abort_on_error` defaults to the configured value.
    #[track_caller]
    pub fn add_outcome(
        &self,
        kind: OutcomeKind,
        reason: impl Into<String>,
        abort_on_error: Option<bool>,
    ) -> OwnerResult<()> {
        self.tracker.add_outcome(
            kind,
            reason,
            abort_on_error.unwrap_or(self.config.default_abort_on_error),
            false,
        )?;
        Ok(())
    }

    pub fn outcome(&self) -> OutcomeKind {
        self.tracker.outcome()
    }

    pub fn outcome_reason(&self) -> String {
        self.tracker.outcome_reason()
    }

    pub fn outcome_location(&self) -> Option<String> {
        self.tracker.outcome_location()
    }

    pub fn outcome_summary(&self) -> String {
        self.tracker.summary()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.tracker.outcomes()
    }

    /// Replaces every outcome with `SKIPPED` and returns the abort that
    /// ends the test. Always `Err`.
    #[track_caller]
    pub fn skip_test(&self, reason: impl Into<String>) -> OwnerResult<()> {
        let reason = reason.into();
        info!("Skipping test: {}", reason);
        self.tracker
            .add_outcome(OutcomeKind::Skipped, reason.clone(), false, true)?;
        Err(Abort {
            kind: OutcomeKind::Skipped,
            reason,
        }
        .into())
    }

    /// Records `kind` and returns the abort that ends the test. Always `Err`.
    #[track_caller]
    pub fn abort(&self, kind: OutcomeKind, reason: impl Into<String>) -> OwnerResult<()> {
        let reason = reason.into();
        self.tracker.add_outcome(kind, reason.clone(), true, false)?;
        Err(Abort { kind, reason }.into())
    }

    // ==========================================================================
    // Cleanup
    // ==========================================================================

    /// Registers a function to run at cleanup, before processes are stopped.
    /// Functions run most recently added first.
    pub fn add_cleanup_function<F>(&mut self, f: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.cleanup_functions.push(Box::new(f));
    }

    /// Releases everything the owner started. Safe to call more than once;
    /// only the first call does anything.
    pub fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        debug!("Cleaning up owner for {}", self.config.output_dir.display());

        for monitor in &self.monitors {
            monitor.stop();
        }
        for monitor in self.monitors.drain(..) {
            let _ = monitor.join(Some(self.config.timeouts.wait_for_process_stop), false);
        }

        self.threads.shutdown();

        while let Some(f) = self.cleanup_functions.pop() {
            if let Err(e) = f() {
                warn!("Cleanup function failed: {:#}", e);
            }
        }

        for process in &self.processes {
            if process.running() {
                info!("Stopping process {} during cleanup", process);
                if let Err(e) = process.stop(self.config.stop_grace_period) {
                    warn!("Failed to stop {} during cleanup: {}", process, e);
                }
            } else {
                // The leader is gone but its children may not be
                process.kill_process_group();
            }
        }
    }
}

impl Drop for ProcessOwner {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn command_stem(command: &Path) -> String {
    command
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "process".to_string())
}

/// Keeps characters that are safe in file names everywhere.
fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
