//! Graceful termination on Windows via console control events.
//!
//! Processes are spawned with `CREATE_NEW_PROCESS_GROUP`, so their pid is
//! also a console process group id that `GenerateConsoleCtrlEvent` accepts.

use parking_lot::{const_mutex, Mutex};
use std::time::Duration;
use windows::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};

/// Console APIs are process-global; serialize our use of them.
static CONSOLE_LOCK: Mutex<()> = const_mutex(());

/// `CREATE_NEW_PROCESS_GROUP` creation flag.
pub const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Sends Ctrl+Break to the process group led by `pid`.
///
/// The call runs on a helper thread so a wedged console cannot block the
/// caller past `timeout`.
pub fn send_ctrl_break(pid: u32, timeout: Duration) -> Result<(), String> {
    if pid == 0 {
        return Err("Refusing to signal process group 0".to_string());
    }

    let _guard = CONSOLE_LOCK.lock();
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let result = unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) };
        let _ = tx.send(result.map_err(|e| e.to_string()));
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("Failed to send Ctrl+Break to PID {}: {}", pid, e)),
        Err(_) => Err(format!("Timeout sending Ctrl+Break to PID {} after {:?}", pid, timeout)),
    }
}
