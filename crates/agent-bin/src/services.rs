use std::sync::Arc;

use anyhow::Result;

use agent_core::config::AgentConfig;
use agent_core::dispatcher::{
    render_status_line, ActionOutput, ActionReport, ServiceAction, ServiceDispatcher,
};
use agent_core::exec::TokioCommandRunner;
use agent_platform::platform::PlatformInfo;

use crate::ServiceCommand;

pub async fn run(
    command: ServiceCommand,
    config: &AgentConfig,
    platform: PlatformInfo,
) -> Result<()> {
    let runner = Arc::new(TokioCommandRunner::new(config.command_timeout()));
    let dispatcher = ServiceDispatcher::new(platform, runner, config.use_sudo);

    let report = match command {
        ServiceCommand::Install { service } => dispatcher.install(service).await?,
        ServiceCommand::Uninstall { service } => dispatcher.uninstall(service).await?,
        ServiceCommand::Start { service } => {
            dispatcher.manage(service, ServiceAction::Start).await?
        }
        ServiceCommand::Stop { service } => dispatcher.manage(service, ServiceAction::Stop).await?,
        ServiceCommand::Restart { service } => {
            dispatcher.manage(service, ServiceAction::Restart).await?
        }
        ServiceCommand::Status { service } => {
            dispatcher.manage(service, ServiceAction::Status).await?
        }
    };

    print_report(&report);
    report.into_result()?;
    Ok(())
}

fn print_report(report: &ActionReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(ActionOutput::Status(status)) => {
                println!("{}", render_status_line(outcome.service, *status))
            }
            Ok(ActionOutput::Done) => println!("{} {}: ok", report.action, outcome.service),
            Err(e) => eprintln!("{} {}: {}", report.action, outcome.service, e),
        }
    }
}
