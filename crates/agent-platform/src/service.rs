use std::fmt;

use crate::command::{CommandOutput, CommandSpec};

/// Normalized state of a managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceStatus {
    Running,
    Stopped,
    Failed,
    NotInstalled,
    Unknown,
}

impl ServiceStatus {
    /// Bracketed label used in the status table
    pub fn label(&self) -> &'static str {
        match self {
            ServiceStatus::Running => "[RUNNING]",
            ServiceStatus::Stopped => "[STOPPED]",
            ServiceStatus::Failed => "[FAILED]",
            ServiceStatus::NotInstalled => "[NOT INSTALLED]",
            ServiceStatus::Unknown => "[UNKNOWN]",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::Running => "running",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Failed => "failed",
            ServiceStatus::NotInstalled => "not-installed",
            ServiceStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
}

/// An OS service manager (systemd, launchd, the Windows SCM) reduced to
/// command building and output classification. Backends never execute
/// anything themselves.
pub trait ServiceBackend: Send + Sync {
    /// Short name for logs, e.g. "systemd"
    fn name(&self) -> &'static str;

    /// Commands to run, in order, to apply `action` to the native unit.
    /// Every command must exit zero for the action to succeed.
    fn control_commands(&self, action: ControlAction, unit: &str) -> Vec<CommandSpec>;

    /// Command whose output describes the unit's state.
    fn status_command(&self, unit: &str) -> CommandSpec;

    /// Map raw status output to a [`ServiceStatus`]. Must accept any input;
    /// output it does not recognize is [`ServiceStatus::Unknown`].
    fn classify_status(&self, unit: &str, output: &CommandOutput) -> ServiceStatus;
}
