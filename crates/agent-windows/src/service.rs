//! Windows Service Control Manager backend: `sc.exe` verbs and `sc.exe query`
//! classification.

use tracing::debug;

use agent_platform::command::{CommandOutput, CommandSpec};
use agent_platform::service::{ControlAction, ServiceBackend, ServiceStatus};

// `sc` alone resolves to Set-Content under PowerShell
const SC: &str = "sc.exe";

/// ERROR_SERVICE_DOES_NOT_EXIST
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;

#[derive(Default)]
pub struct ScBackend;

impl ScBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ServiceBackend for ScBackend {
    fn name(&self) -> &'static str {
        "scm"
    }

    fn control_commands(&self, action: ControlAction, unit: &str) -> Vec<CommandSpec> {
        let start = CommandSpec::new(SC, ["start", unit]);
        let stop = CommandSpec::new(SC, ["stop", unit]);
        match action {
            ControlAction::Start => vec![start],
            ControlAction::Stop => vec![stop],
            ControlAction::Restart => vec![stop, start],
        }
    }

    fn status_command(&self, unit: &str) -> CommandSpec {
        CommandSpec::new(SC, ["query", unit])
    }

    fn classify_status(&self, unit: &str, output: &CommandOutput) -> ServiceStatus {
        let text = output.output.as_str();

        if output.exit_code == Some(ERROR_SERVICE_DOES_NOT_EXIST)
            || text.contains("FAILED 1060")
            || text.contains("does not exist")
        {
            return ServiceStatus::NotInstalled;
        }

        // "        STATE              : 4  RUNNING"
        let state = text
            .lines()
            .map(str::trim)
            .find(|l| l.starts_with("STATE"))
            .unwrap_or("");

        if state.contains("PENDING") {
            ServiceStatus::Unknown
        } else if state.contains("RUNNING") {
            ServiceStatus::Running
        } else if state.contains("STOPPED") {
            ServiceStatus::Stopped
        } else {
            debug!(
                "unrecognized sc query output for {} ({}): {:?}",
                unit,
                output.exit_info(),
                text.trim()
            );
            ServiceStatus::Unknown
        }
    }
}
