use std::io;

use agent_platform::process::ProcessControl;

/// Liveness probe and termination for real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessControl;

#[cfg(unix)]
impl ProcessControl for SystemProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;

        // kill(0, ..) and negative PIDs address process groups
        let Some(pid) = unix_pid(pid) else {
            return false;
        };
        match kill(pid, None) {
            Ok(()) => true,
            // exists but belongs to someone else
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};

        let target = unix_pid(pid).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid PID {}", pid))
        })?;
        kill(target, Signal::SIGTERM).map_err(io::Error::from)
    }
}

#[cfg(unix)]
fn unix_pid(pid: u32) -> Option<nix::unistd::Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Some(nix::unistd::Pid::from_raw(raw)),
        _ => None,
    }
}

#[cfg(windows)]
impl ProcessControl for SystemProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        pid != 0 && agent_windows::process::is_alive(pid)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        agent_windows::process::terminate(pid)
    }
}

#[cfg(not(any(unix, windows)))]
impl ProcessControl for SystemProcessControl {
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }

    fn terminate(&self, _pid: u32) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "process control not supported"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(SystemProcessControl.is_alive(std::process::id()));
    }

    #[test]
    fn test_group_addressing_pids_are_never_alive() {
        assert!(!SystemProcessControl.is_alive(0));
        assert!(!SystemProcessControl.is_alive(u32::MAX));
        assert!(SystemProcessControl.terminate(0).is_err());
    }

    #[test]
    fn test_reaped_child_is_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!SystemProcessControl.is_alive(pid));
    }

    #[test]
    fn test_terminate_running_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        SystemProcessControl.terminate(child.id()).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
