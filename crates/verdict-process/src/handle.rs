//! A live, shareable handle on one spawned process.

use crate::environment::resolve_environment;
use crate::spec::ProcessSpec;
use crate::state::{ProcessState, ProcessStateMachine};
use crate::stdin::StdinWriter;
use crate::terminate;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use verdict_common::{ExecutionMode, ProcessError, ProcessResult};
use wait_timeout::ChildExt;

/// How long to wait for the OS to reap a process after a forced kill.
pub const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(3);

/// Longest time the child lock is held by one wait step.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, or the negated signal number when killed by a signal.
    pub code: i32,
    pub signal: Option<i32>,
    pub core_dumped: bool,
}

impl ExitInfo {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            let signal = status.signal();
            Self {
                code: status.code().unwrap_or_else(|| -signal.unwrap_or(0)),
                signal,
                core_dumped: status.core_dumped(),
            }
        }

        #[cfg(not(unix))]
        {
            Self {
                code: status.code().unwrap_or(-1),
                signal: None,
                core_dumped: false,
            }
        }
    }
}

/// Shared handle on a spawned process. Clones refer to the same process.
///
/// When the last clone is dropped a still-running process is killed.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<Inner>,
}

struct Inner {
    display_name: String,
    command: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    mode: ExecutionMode,
    stdout: Option<PathBuf>,
    stderr: Option<PathBuf>,
    pid: u32,
    // Lock order: child, then exit, then state
    child: Mutex<Child>,
    exit: Mutex<Option<ExitInfo>>,
    state: Mutex<ProcessStateMachine>,
    stdin: Mutex<Option<StdinWriter>>,
    stop_requested: AtomicBool,
}

impl ProcessHandle {
    /// Spawns the process described by `spec`.
    ///
    /// Output goes to `spec.stdout`/`spec.stderr` (discarded when unset).
    /// The child leads a new process group so it can be stopped together
    /// with anything it starts. Background processes get a stdin pipe.
    pub fn spawn(spec: &ProcessSpec) -> ProcessResult<Self> {
        let display_name = spec.default_display_name();

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .env_clear()
            .envs(resolve_environment(spec.environment.as_ref()));

        if let Some(dir) = &spec.working_dir {
            if !dir.is_dir() {
                return Err(ProcessError::spawn_failed(
                    &display_name,
                    format!("working directory {} does not exist", dir.display()),
                ));
            }
            cmd.current_dir(dir);
        }

        cmd.stdout(open_output(&display_name, spec.stdout.as_deref())?);
        cmd.stderr(open_output(&display_name, spec.stderr.as_deref())?);
        cmd.stdin(match spec.mode {
            ExecutionMode::Background => Stdio::piped(),
            ExecutionMode::Foreground => Stdio::null(),
        });

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(crate::terminate_windows::CREATE_NEW_PROCESS_GROUP);
        }

        debug!(
            "Starting {}: {} {:?} in {:?}",
            display_name,
            spec.command.display(),
            spec.args,
            spec.working_dir
        );
        let mut child = cmd.spawn().map_err(|e| {
            ProcessError::spawn_failed(&display_name, format!("{}: {}", spec.command.display(), e))
        })?;

        let pid = child.id();
        let stdin = child.stdin.take().map(|pipe| StdinWriter::new(&display_name, pipe));
        let mut state = ProcessStateMachine::new(&display_name);
        state.transition_to(ProcessState::Running)?;

        info!("Started process {} with pid {} ({})", display_name, pid, spec.mode);

        Ok(Self {
            inner: Arc::new(Inner {
                display_name,
                command: spec.command.clone(),
                args: spec.args.clone(),
                working_dir: spec.working_dir.clone(),
                mode: spec.mode,
                stdout: spec.stdout.clone(),
                stderr: spec.stderr.clone(),
                pid,
                child: Mutex::new(child),
                exit: Mutex::new(None),
                state: Mutex::new(state),
                stdin: Mutex::new(stdin),
                stop_requested: AtomicBool::new(false),
            }),
        })
    }

    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    pub fn command(&self) -> &Path {
        &self.inner.command
    }

    pub fn args(&self) -> &[String] {
        &self.inner.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.inner.working_dir.as_deref()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.inner.mode
    }

    pub fn stdout(&self) -> Option<&Path> {
        self.inner.stdout.as_deref()
    }

    pub fn stderr(&self) -> Option<&Path> {
        self.inner.stderr.as_deref()
    }

    pub fn state(&self) -> ProcessState {
        self.inner.state.lock().current_state()
    }

    /// Exit code once the process has ended and been observed.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_info().map(|info| info.code)
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.inner.exit.lock()
    }

    /// Whether the process is still running. Reaps it if it has exited.
    pub fn running(&self) -> bool {
        if self.inner.exit.lock().is_some() {
            return false;
        }

        let status = {
            let mut child = self.inner.child.lock();
            match child.try_wait() {
                Ok(status) => status,
                Err(e) => {
                    warn!("Failed to query status of {}: {}", self.inner.display_name, e);
                    return false;
                }
            }
        };

        match status {
            Some(status) => {
                self.record_exit(status);
                false
            }
            None => true,
        }
    }

    /// Blocks until the process exits or `timeout` passes.
    ///
    /// Returns `Ok(true)` if it exited. A timeout leaves it running.
    pub fn wait(&self, timeout: Duration) -> ProcessResult<bool> {
        // An unrepresentable deadline means waiting without one
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if self.inner.exit.lock().is_some() {
                return Ok(true);
            }

            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => WAIT_SLICE,
            };
            let status = {
                let mut child = self.inner.child.lock();
                child
                    .wait_timeout(remaining.min(WAIT_SLICE))
                    .map_err(|e| ProcessError::wait_failed(&self.inner.display_name, e.to_string()))?
            };

            if let Some(status) = status {
                self.record_exit(status);
                return Ok(true);
            }
            if remaining.is_zero() {
                return Ok(false);
            }
        }
    }

    /// Stops the process, escalating to a forced kill after `grace`.
    ///
    /// Stopping a process that has already exited does nothing.
    pub fn stop(&self, grace: Duration) -> ProcessResult<()> {
        if !self.running() {
            debug!("Process {} is not running, nothing to stop", self.inner.display_name);
            return Ok(());
        }

        self.inner.stop_requested.store(true, Ordering::SeqCst);
        info!("Stopping process {} (pid {})", self.inner.display_name, self.inner.pid);

        if let Err(e) = terminate::request_termination(self.inner.pid) {
            warn!("Graceful stop of {} failed: {}", self.inner.display_name, e);
        }
        if self.wait(grace)? {
            self.kill_process_group();
            return Ok(());
        }

        warn!(
            "Process {} still running after {:?}, killing it",
            self.inner.display_name, grace
        );
        if let Err(e) = terminate::force_kill(self.inner.pid) {
            warn!("Force kill of {} group failed: {}", self.inner.display_name, e);
        }
        if let Err(e) = self.inner.child.lock().kill() {
            debug!("Kill of {} reported: {}", self.inner.display_name, e);
        }

        if self.wait(FORCE_KILL_TIMEOUT)? {
            self.kill_process_group();
            Ok(())
        } else {
            Err(ProcessError::stop_failed(
                &self.inner.display_name,
                "process is still running after a forced kill",
            ))
        }
    }

    /// Kills any members left in the process group once the leader has
    /// exited. Children that ignored TERM end here. No-op while the leader
    /// is still running.
    pub fn kill_process_group(&self) {
        if self.running() {
            return;
        }
        if let Err(e) = terminate::kill_group(self.inner.pid) {
            warn!("Killing process group of {} failed: {}", self.inner.display_name, e);
        }
    }

    /// Sends a POSIX signal. Unsupported on Windows.
    pub fn signal(&self, signal: i32) -> ProcessResult<()> {
        if !self.running() {
            return Err(ProcessError::signal_failed(
                &self.inner.display_name,
                "process is not running",
            ));
        }
        info!("Sending signal {} to process {}", signal, self.inner.display_name);
        terminate::send_signal(self.inner.pid, signal)
    }

    /// Writes to the process's stdin if it is running.
    ///
    /// Never fails: problems are logged and `false` is returned.
    pub fn write(&self, data: &[u8], add_newline: bool) -> bool {
        if !self.running() {
            warn!(
                "Ignoring write to stdin of {}: process is not running",
                self.inner.display_name
            );
            return false;
        }

        let mut bytes = data.to_vec();
        if add_newline && !bytes.ends_with(b"\n") {
            bytes.push(b'\n');
        }

        let mut stdin = self.inner.stdin.lock();
        let Some(writer) = stdin.as_mut() else {
            warn!("Process {} has no stdin pipe", self.inner.display_name);
            return false;
        };
        match writer.write(bytes) {
            Ok(()) => {
                debug!("Queued {} bytes for stdin of {}", data.len(), self.inner.display_name);
                true
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Closes stdin after pending writes, signalling end of input.
    pub fn close_stdin(&self) {
        if let Some(writer) = self.inner.stdin.lock().as_mut() {
            writer.close();
        }
    }

    fn record_exit(&self, status: ExitStatus) {
        let info = ExitInfo::from_status(status);
        let mut exit = self.inner.exit.lock();
        if exit.is_some() {
            return;
        }
        *exit = Some(info);

        let target = if self.inner.stop_requested.load(Ordering::SeqCst) {
            ProcessState::Killed
        } else {
            ProcessState::Exited(info.code)
        };
        if let Err(e) = self.inner.state.lock().transition_to(target) {
            warn!("{}", e);
        }
        debug!(
            "Process {} finished with status {} ({})",
            self.inner.display_name, info.code, target
        );
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("display_name", &self.inner.display_name)
            .field("pid", &self.inner.pid)
            .field("mode", &self.inner.mode)
            .finish()
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.display_name)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let child = self.child.get_mut();
        if let Ok(None) = child.try_wait() {
            debug!("Killing abandoned process {} (pid {})", self.display_name, self.pid);
            let _ = terminate::force_kill(self.pid);
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn open_output(name: &str, path: Option<&Path>) -> ProcessResult<Stdio> {
    let Some(path) = path else {
        return Ok(Stdio::null());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            ProcessError::spawn_failed(name, format!("cannot create {}: {}", parent.display(), e))
        })?;
    }
    let file = File::create(path)
        .map_err(|e| ProcessError::spawn_failed(name, format!("cannot open {}: {}", path.display(), e)))?;
    Ok(Stdio::from(file))
}
