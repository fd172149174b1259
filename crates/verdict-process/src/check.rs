//! Process existence checks by pid.
//!
//! Used for processes verdict did not spawn itself (monitoring an arbitrary
//! pid). For spawned processes prefer `ProcessHandle::running`, which also
//! reaps the child.

use verdict_common::{ProcessError, ProcessResult};

/// Returns whether a process with this pid currently exists.
///
/// Unix uses `kill(pid, 0)`: no signal is delivered. `EPERM` means the
/// process exists but belongs to someone else. A zombie that has not been
/// reaped still counts as existing.
pub fn process_exists(pid: u32) -> ProcessResult<bool> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // 0 and negative values address process groups, not a process
        let Ok(raw) = i32::try_from(pid) else {
            return Ok(false);
        };
        if raw == 0 {
            return Ok(false);
        }

        match kill(Pid::from_raw(raw), None) {
            Ok(()) | Err(Errno::EPERM) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(ProcessError::check_failed(pid.to_string(), e.to_string())),
        }
    }

    #[cfg(windows)]
    {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

        // OpenProcess fails with invalid parameter for unknown pids
        match unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) } {
            Ok(handle) => {
                let _ = unsafe { CloseHandle(handle) };
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_exists() {
        assert!(process_exists(std::process::id()).unwrap());
    }

    #[test]
    #[cfg(unix)]
    fn test_reaped_child_does_not_exist() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!process_exists(pid).unwrap());
    }
}
