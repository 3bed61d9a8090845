//! Cooperative interrupt delivery.

use crate::error::SignalError;

/// Send SIGINT to `pid`.
///
/// The worker is expected to catch the interrupt and report an `error`
/// message with `cancelled: true`; nothing here escalates to a kill.
#[cfg(unix)]
pub fn interrupt(pid: u32) -> Result<(), SignalError> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if ret == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Err(SignalError::AlreadyTerminated)
    } else {
        Err(SignalError::Failed(err))
    }
}

#[cfg(not(unix))]
pub fn interrupt(_pid: u32) -> Result<(), SignalError> {
    Err(SignalError::Unsupported)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_interrupt_live_process() {
        let mut child = std::process::Command::new("sleep").arg("5").spawn().unwrap();

        interrupt(child.id()).unwrap();

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGINT));
    }
}
