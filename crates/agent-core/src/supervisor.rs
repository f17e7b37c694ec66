//! Single-instance enforcement, daemonization and the foreground run loop.
//!
//! The PID file is the only persisted record. It is overwritten on each
//! start and never removed; a file naming a dead process reads as stopped.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use agent_platform::process::ProcessControl;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::heartbeat::{Heartbeat, HeartbeatScheduler};
use crate::process::SystemProcessControl;

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the recorded PID. A missing, unreadable or non-numeric file is
    /// an error.
    pub fn read_pid(&self) -> Result<u32, AgentError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| AgentError::PidFileUnreadable {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        contents
            .trim()
            .parse::<u32>()
            .map_err(|e| AgentError::PidFileUnreadable {
                path: self.path.clone(),
                reason: format!("invalid PID {:?}: {}", contents.trim(), e),
            })
    }

    /// Overwrite the file with `pid`, creating the parent directory if needed.
    pub fn write_pid(&self, pid: u32) -> Result<(), AgentError> {
        let write_err = |e: std::io::Error| AgentError::PidFileWrite {
            path: self.path.clone(),
            reason: e.to_string(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(write_err)?;
        write!(file, "{}", pid).map_err(write_err)?;

        debug!("PID file {} now holds {}", self.path.display(), pid);
        Ok(())
    }
}

/// Lifecycle of the foreground agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotRunning,
    Starting,
    Running,
    StopPending,
}

/// Result of `ss-agent status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Running { pid: u32 },
    Stopped,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Running { .. } => f.write_str("running"),
            AgentStatus::Stopped => f.write_str("stopped"),
        }
    }
}

/// How to relaunch the agent as a detached background process.
#[derive(Debug, Clone)]
pub struct DaemonLaunch {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// stdout and stderr of the child are appended here
    pub log_file: PathBuf,
}

pub struct Supervisor<P: ProcessControl = SystemProcessControl> {
    pid_file: PidFile,
    process: P,
    state: watch::Sender<LifecycleState>,
}

impl Supervisor {
    pub fn new(pid_file: impl Into<PathBuf>) -> Self {
        Self::with_process(pid_file, SystemProcessControl)
    }
}

impl<P: ProcessControl> Supervisor<P> {
    pub fn with_process(pid_file: impl Into<PathBuf>, process: P) -> Self {
        let (state, _) = watch::channel(LifecycleState::NotRunning);
        Self {
            pid_file: PidFile::new(pid_file),
            process,
            state,
        }
    }

    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    fn set_state(&self, state: LifecycleState) {
        debug!("lifecycle: {:?}", state);
        self.state.send_replace(state);
    }

    /// PID of another live agent instance, if the PID file names one.
    fn running_pid(&self) -> Option<u32> {
        let pid = match self.pid_file.read_pid() {
            Ok(pid) => pid,
            Err(e) => {
                debug!("no running instance: {}", e);
                return None;
            }
        };
        // a daemon child finds its own PID, written by its parent
        if pid == std::process::id() {
            return None;
        }
        self.process.is_alive(pid).then_some(pid)
    }

    /// Whether another agent instance is alive. Any doubt reads as "no".
    pub fn check_running_instance(&self) -> bool {
        self.running_pid().is_some()
    }

    pub fn ensure_not_running(&self) -> Result<(), AgentError> {
        match self.running_pid() {
            Some(pid) => Err(AgentError::AlreadyRunning {
                pid,
                path: self.pid_file.path().to_path_buf(),
            }),
            None => Ok(()),
        }
    }

    /// Relaunch the agent in the background and record the child's PID.
    /// Returns as soon as the child is spawned.
    pub fn daemonize(&self, launch: &DaemonLaunch) -> Result<u32, AgentError> {
        self.ensure_not_running()?;

        let log_err = |e: std::io::Error| {
            AgentError::Daemonize(format!("log file {}: {}", launch.log_file.display(), e))
        };
        if let Some(dir) = launch.log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(log_err)?;
        }
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&launch.log_file)
            .map_err(log_err)?;
        let stderr = stdout.try_clone().map_err(log_err)?;

        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        detach(&mut command);

        let child = command
            .spawn()
            .map_err(|e| AgentError::Daemonize(format!("{}: {}", launch.program.display(), e)))?;
        let pid = child.id();

        self.pid_file.write_pid(pid)?;
        info!(
            "agent started in background (PID {}), logging to {}",
            pid,
            launch.log_file.display()
        );
        Ok(pid)
    }

    /// Run in the foreground until `shutdown` fires: record our PID, keep
    /// the heartbeat going, then cancel it and wait for it to finish.
    pub async fn run_foreground(
        &self,
        scheduler: HeartbeatScheduler,
        heartbeat: Arc<dyn Heartbeat>,
        shutdown: CancellationToken,
    ) -> Result<(), AgentError> {
        self.ensure_not_running()?;
        self.set_state(LifecycleState::Starting);

        let pid = std::process::id();
        if let Err(e) = self.pid_file.write_pid(pid) {
            self.set_state(LifecycleState::NotRunning);
            return Err(e);
        }

        let heartbeat_cancel = shutdown.child_token();
        let heartbeat_task = tokio::spawn(scheduler.run(heartbeat, heartbeat_cancel.clone()));

        self.set_state(LifecycleState::Running);
        info!("agent running (PID {})", pid);

        shutdown.cancelled().await;

        info!("shutting down");
        self.set_state(LifecycleState::StopPending);
        heartbeat_cancel.cancel();
        if let Err(e) = heartbeat_task.await {
            warn!("heartbeat task ended abnormally: {}", e);
        }

        self.set_state(LifecycleState::NotRunning);
        info!("agent stopped");
        Ok(())
    }

    /// Ask the recorded process to terminate. Does not wait for it to exit.
    pub fn stop(&self) -> Result<u32, AgentError> {
        let pid = self.pid_file.read_pid()?;
        info!("stopping agent (PID {})", pid);
        self.process.terminate(pid).map_err(|e| AgentError::Signal {
            pid,
            reason: e.to_string(),
        })?;
        Ok(pid)
    }

    pub fn status(&self) -> AgentStatus {
        match self.running_pid() {
            Some(pid) => AgentStatus::Running { pid },
            None => AgentStatus::Stopped,
        }
    }
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    // own process group, so a terminal's SIGINT does not reach the daemon
    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut Command) {}
