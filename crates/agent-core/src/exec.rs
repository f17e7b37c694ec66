use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use agent_platform::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};

/// Runs commands as child processes with a hard deadline. The child is
/// killed if the deadline passes.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        debug!("exec: {}", spec);

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CommandError::Spawn {
                    command: spec.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(CommandError::Timeout {
                    command: spec.to_string(),
                    timeout: self.timeout,
                })
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        debug!("exec done: {} ({:?})", spec, output.status.code());
        Ok(CommandOutput {
            exit_code: output.status.code(),
            output: text,
        })
    }
}
