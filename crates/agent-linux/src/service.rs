//! systemd backend: `systemctl` verbs and `systemctl is-active` classification.

use tracing::debug;

use agent_platform::command::{CommandOutput, CommandSpec};
use agent_platform::service::{ControlAction, ServiceBackend, ServiceStatus};

const SYSTEMCTL: &str = "systemctl";

/// `systemctl is-active` exit code for a unit systemd has never heard of
const EXIT_UNIT_NOT_FOUND: i32 = 4;

pub struct SystemdBackend {
    /// Run control verbs through sudo
    use_sudo: bool,
}

impl SystemdBackend {
    pub fn new(use_sudo: bool) -> Self {
        Self { use_sudo }
    }
}

impl ServiceBackend for SystemdBackend {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn control_commands(&self, action: ControlAction, unit: &str) -> Vec<CommandSpec> {
        let verb = match action {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
            ControlAction::Restart => "restart",
        };
        vec![CommandSpec::new(SYSTEMCTL, [verb, unit]).elevated(self.use_sudo)]
    }

    fn status_command(&self, unit: &str) -> CommandSpec {
        CommandSpec::new(SYSTEMCTL, ["is-active", unit])
    }

    fn classify_status(&self, unit: &str, output: &CommandOutput) -> ServiceStatus {
        // is-active exits non-zero for every state but "active", so the
        // printed state decides, not the exit code.
        let text = output.output.trim();
        let state = text.lines().next().unwrap_or("").trim();

        match state {
            "active" if output.success() => ServiceStatus::Running,
            "inactive" => ServiceStatus::Stopped,
            "failed" => ServiceStatus::Failed,
            // older systemd prints "unknown" for units it cannot find
            "unknown" => ServiceStatus::NotInstalled,
            _ if text.contains("could not be found")
                || output.exit_code == Some(EXIT_UNIT_NOT_FOUND) =>
            {
                ServiceStatus::NotInstalled
            }
            _ => {
                debug!(
                    "unrecognized is-active output for {} ({}): {:?}",
                    unit,
                    output.exit_info(),
                    text
                );
                ServiceStatus::Unknown
            }
        }
    }
}
