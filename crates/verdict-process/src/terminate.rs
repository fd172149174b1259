//! Process termination and signalling primitives.
//!
//! Spawned processes lead their own process group (Unix) or console process
//! group (Windows), so termination can reach the children they started too.
//! A target that has already gone away is not an error.

use verdict_common::{ProcessError, ProcessResult};

/// Politely asks a process and its group to exit.
///
/// SIGTERM to the pid and to its process group on Unix, Ctrl+Break to the
/// process group on Windows.
pub fn request_termination(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::Signal;
        signal_tree(pid, Signal::SIGTERM)
    }

    #[cfg(windows)]
    {
        crate::terminate_windows::send_ctrl_break(pid, std::time::Duration::from_secs(5))
            .map_err(|e| ProcessError::stop_failed(pid.to_string(), e))
    }
}

/// Forcefully kills a process and its group.
pub fn force_kill(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::Signal;
        signal_tree(pid, Signal::SIGKILL)
    }

    #[cfg(windows)]
    {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

        unsafe {
            let handle = match OpenProcess(PROCESS_TERMINATE, false, pid) {
                Ok(h) if !h.is_invalid() => h,
                // Already gone
                _ => return Ok(()),
            };
            let result = TerminateProcess(handle, 1);
            let _ = CloseHandle(handle);
            result.map_err(|e| {
                ProcessError::stop_failed(pid.to_string(), format!("TerminateProcess failed: {}", e))
            })
        }
    }
}

/// Kills whatever is left of the process group led by `pgid`.
///
/// Only the group is signalled, never the pid itself, so this is safe to
/// call after the leader has been reaped: a group with members cannot have
/// its id reused. An empty group is not an error. Windows has no equivalent
/// for console process groups and does nothing.
pub fn kill_group(pgid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pgid) else {
            return Ok(());
        };
        if raw <= 1 {
            return Ok(());
        }
        match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) | Err(Errno::EPERM) => Ok(()),
            Err(e) => Err(ProcessError::stop_failed(pgid.to_string(), e.to_string())),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pgid;
        Ok(())
    }
}

/// Delivers an arbitrary POSIX signal number to one process.
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: i32) -> ProcessResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = Signal::try_from(signal)
        .map_err(|_| ProcessError::signal_failed(pid.to_string(), format!("invalid signal {}", signal)))?;
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(ProcessError::not_found(pid.to_string())),
        Err(e) => Err(ProcessError::signal_failed(pid.to_string(), e.to_string())),
    }
}

/// Signals are a POSIX concept.
#[cfg(not(unix))]
pub fn send_signal(pid: u32, _signal: i32) -> ProcessResult<()> {
    Err(ProcessError::signals_unsupported(pid.to_string()))
}

#[cfg(unix)]
fn signal_tree(pid: u32, signal: nix::sys::signal::Signal) -> ProcessResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    let nix_pid = Pid::from_raw(pid as i32);
    match kill(nix_pid, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => return Err(ProcessError::stop_failed(pid.to_string(), e.to_string())),
    }
    // The group outlives its leader while children remain
    match killpg(nix_pid, signal) {
        Ok(()) | Err(Errno::ESRCH) | Err(Errno::EPERM) => Ok(()),
        Err(e) => Err(ProcessError::stop_failed(pid.to_string(), e.to_string())),
    }
}
