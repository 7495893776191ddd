//! Process group signalling.
//!
//! Checkers are spawned as the leader of their own process group so that
//! helpers they fork are signalled together with them.

use std::io;

/// Signal sent to a checker's process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Ask the group to shut down (SIGTERM)
    Terminate,
    /// Force the group down (SIGKILL)
    Kill,
}

impl Signal {
    #[cfg(unix)]
    fn raw(self) -> libc::c_int {
        match self {
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminate => write!(f, "SIGTERM"),
            Self::Kill => write!(f, "SIGKILL"),
        }
    }
}

/// Send `signal` to every process in the group led by `pgid`.
///
/// A group with no members left is not an error.
///
/// # Errors
///
/// Returns error if the signal could not be delivered for any other reason
#[cfg(unix)]
pub fn signal_group(pgid: u32, signal: Signal) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pgid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    if pid <= 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a process group"));
    }

    // SAFETY: kill(2) only delivers a signal; no memory is shared with the callee.
    let rc = unsafe { libc::kill(-pid, signal.raw()) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

/// Whether any process of the group led by `pgid` still exists
#[cfg(unix)]
#[must_use]
pub fn group_alive(pgid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pgid) else {
        return false;
    };
    // SAFETY: signal 0 performs the permission and existence check only.
    let rc = unsafe { libc::kill(-pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;
    use std::os::unix::process::CommandExt;

    #[test]
    fn test_signal_reaches_group() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("sleep 30 & wait")
            .process_group(0)
            .spawn()
            .unwrap();
        let pgid = child.id();
        assert!(group_alive(pgid));

        signal_group(pgid, Signal::Kill).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_empty_group_is_not_an_error() {
        let mut child = Command::new("true").process_group(0).spawn().unwrap();
        let pgid = child.id();
        child.wait().unwrap();
        assert!(signal_group(pgid, Signal::Terminate).is_ok());
    }

    #[test]
    fn test_rejects_invalid_pid() {
        assert!(signal_group(0, Signal::Kill).is_err());
    }
}
