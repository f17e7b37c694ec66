//! launchd backend: `launchctl` verbs and `launchctl list <label>` classification.

use tracing::debug;

use agent_platform::command::{CommandOutput, CommandSpec};
use agent_platform::service::{ControlAction, ServiceBackend, ServiceStatus};

const LAUNCHCTL: &str = "launchctl";

/// launchctl exit code for "Could not find service ... in domain"
const EXIT_SERVICE_NOT_FOUND: i32 = 113;

#[derive(Default)]
pub struct LaunchdBackend;

impl LaunchdBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ServiceBackend for LaunchdBackend {
    fn name(&self) -> &'static str {
        "launchd"
    }

    fn control_commands(&self, action: ControlAction, unit: &str) -> Vec<CommandSpec> {
        let start = CommandSpec::new(LAUNCHCTL, ["start", unit]);
        let stop = CommandSpec::new(LAUNCHCTL, ["stop", unit]);
        match action {
            ControlAction::Start => vec![start],
            ControlAction::Stop => vec![stop],
            // launchctl has no restart verb
            ControlAction::Restart => vec![stop, start],
        }
    }

    fn status_command(&self, unit: &str) -> CommandSpec {
        CommandSpec::new(LAUNCHCTL, ["list", unit])
    }

    fn classify_status(&self, unit: &str, output: &CommandOutput) -> ServiceStatus {
        let text = output.output.as_str();

        if output.exit_code == Some(EXIT_SERVICE_NOT_FOUND)
            || text.to_ascii_lowercase().contains("could not find service")
        {
            return ServiceStatus::NotInstalled;
        }

        if !output.success() {
            debug!("launchctl list {} returned {}: {:?}", unit, output.exit_info(), text.trim());
            return ServiceStatus::Unknown;
        }

        if !text.contains(unit) {
            return ServiceStatus::Stopped;
        }

        if text.contains("\"PID\"") {
            return ServiceStatus::Running;
        }

        // Loaded but not running: a non-zero last exit means it died.
        match last_exit_status(text) {
            Some(code) if code != 0 => ServiceStatus::Failed,
            _ => ServiceStatus::Stopped,
        }
    }
}

/// Value of `"LastExitStatus" = N;` in `launchctl list <label>` output.
fn last_exit_status(text: &str) -> Option<i64> {
    text.lines()
        .map(str::trim)
        .find(|l| l.starts_with("\"LastExitStatus\""))
        .and_then(|l| l.split('=').nth(1))
        .and_then(|v| v.trim().trim_end_matches(';').trim().parse().ok())
}
