//! Two-phase stop for child processes: a graceful request, then a forced kill.

use std::io;

use tokio::process::Child;

use crate::error::HarnessError;

/// Ask `child` to shut down gracefully (SIGTERM).
///
/// A child that has already exited or been reaped is not an error.
#[cfg(unix)]
pub fn request_stop(child: &mut Child) -> Result<(), HarnessError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid)
        .map_err(|_| HarnessError::Signal(format!("pid {pid} out of range")))?;
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(HarnessError::Signal(format!("SIGTERM to {pid}: {errno}"))),
    }
}

/// No graceful request exists here; stopping means terminating.
#[cfg(not(unix))]
pub fn request_stop(child: &mut Child) -> Result<(), HarnessError> {
    force_stop(child)
}

/// Forcefully terminate `child` (SIGKILL on unix).
pub fn force_stop(child: &mut Child) -> Result<(), HarnessError> {
    match child.start_kill() {
        Ok(()) => Ok(()),
        // Already reaped.
        Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(()),
        Err(err) => Err(HarnessError::Signal(format!("forced stop: {err}"))),
    }
}
