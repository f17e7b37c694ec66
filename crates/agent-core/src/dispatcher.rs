//! Uniform install / uninstall / start / stop / restart / status over the
//! managed services, whatever the host's package and service managers are.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use agent_linux::service::SystemdBackend;
use agent_macos::service::LaunchdBackend;
use agent_platform::command::{CommandRunner, CommandSpec};
use agent_platform::platform::{OsFamily, PlatformInfo};
use agent_platform::service::{ControlAction, ServiceBackend, ServiceStatus};
use agent_windows::service::ScBackend;

use crate::error::AgentError;
use crate::registry::{self, ManagedService, PackageManager, PackageOp, ServiceTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Status,
}

impl ServiceAction {
    /// Service-manager verb, or `None` for the read-only status query.
    pub fn control(&self) -> Option<ControlAction> {
        match self {
            ServiceAction::Start => Some(ControlAction::Start),
            ServiceAction::Stop => Some(ControlAction::Stop),
            ServiceAction::Restart => Some(ControlAction::Restart),
            ServiceAction::Status => None,
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Status => "status",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutput {
    Done,
    Status(ServiceStatus),
}

#[derive(Debug)]
pub struct ServiceOutcome {
    pub service: ManagedService,
    pub result: Result<ActionOutput, AgentError>,
}

/// Per-service results of one action, in registry order.
#[derive(Debug)]
pub struct ActionReport {
    pub action: String,
    pub target: ServiceTarget,
    pub outcomes: Vec<ServiceOutcome>,
}

impl ActionReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> Vec<ManagedService> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.service)
            .collect()
    }

    /// Collapse into a single result. A single-service failure is returned
    /// as is; a fan-out with any failure becomes `PartialFailure`.
    pub fn into_result(self) -> Result<(), AgentError> {
        match self.target {
            ServiceTarget::One(_) => self
                .outcomes
                .into_iter()
                .find_map(|o| o.result.err())
                .map_or(Ok(()), Err),
            ServiceTarget::All => {
                let failed = self.failed();
                if failed.is_empty() {
                    Ok(())
                } else {
                    Err(AgentError::PartialFailure {
                        action: self.action,
                        failed: failed.iter().map(|s| s.name().to_string()).collect(),
                    })
                }
            }
        }
    }
}

/// Fixed-width status table line, e.g. `fluent-bit     : [RUNNING]`.
pub fn render_status_line(service: ManagedService, status: ServiceStatus) -> String {
    format!("{:<15}: {}", service.name(), status.label())
}

/// Native service manager for an OS family.
pub fn backend_for(family: OsFamily, use_sudo: bool) -> Box<dyn ServiceBackend> {
    match family {
        OsFamily::Linux => Box::new(SystemdBackend::new(use_sudo)),
        OsFamily::Darwin => Box::new(LaunchdBackend::new()),
        OsFamily::Windows => Box::new(ScBackend::new()),
    }
}

pub struct ServiceDispatcher {
    platform: PlatformInfo,
    backend: Box<dyn ServiceBackend>,
    runner: Arc<dyn CommandRunner>,
    use_sudo: bool,
}

impl ServiceDispatcher {
    pub fn new(platform: PlatformInfo, runner: Arc<dyn CommandRunner>, use_sudo: bool) -> Self {
        let backend = backend_for(platform.family, use_sudo);
        Self {
            platform,
            backend,
            runner,
            use_sudo,
        }
    }

    pub async fn install(&self, target: ServiceTarget) -> Result<ActionReport, AgentError> {
        self.package(PackageOp::Install, target).await
    }

    pub async fn uninstall(&self, target: ServiceTarget) -> Result<ActionReport, AgentError> {
        self.package(PackageOp::Uninstall, target).await
    }

    async fn package(
        &self,
        op: PackageOp,
        target: ServiceTarget,
    ) -> Result<ActionReport, AgentError> {
        let manager = PackageManager::for_platform(&self.platform)?;
        debug!("package manager for {}: {:?}", self.platform, manager);

        let mut outcomes = Vec::new();
        for service in target.services() {
            info!("{}ing {}", op, service);
            let command = manager.command(op, service, self.use_sudo);
            let result = self.run_checked(&command).await.map(|()| ActionOutput::Done);
            match &result {
                Ok(_) => info!("{} {}: ok", op, service),
                Err(e) => warn!("{} {} failed: {}", op, service, e),
            }
            outcomes.push(ServiceOutcome { service, result });
        }

        Ok(ActionReport {
            action: op.to_string(),
            target,
            outcomes,
        })
    }

    /// Apply `action` to each targeted service in registry order. Every
    /// member is attempted; failures are collected in the report.
    pub async fn manage(
        &self,
        target: ServiceTarget,
        action: ServiceAction,
    ) -> Result<ActionReport, AgentError> {
        let units = self.resolve_units(target)?;

        let mut outcomes = Vec::with_capacity(units.len());
        for (service, unit) in units {
            let result = match action.control() {
                Some(control) => self
                    .control_one(service, unit, control)
                    .await
                    .map(|()| ActionOutput::Done),
                None => Ok(ActionOutput::Status(self.query_status(service, unit).await)),
            };
            outcomes.push(ServiceOutcome { service, result });
        }

        Ok(ActionReport {
            action: action.to_string(),
            target,
            outcomes,
        })
    }

    /// Status of each targeted service in registry order. Never fails once
    /// the native names resolve; ambiguous answers are `Unknown`.
    pub async fn status(
        &self,
        target: ServiceTarget,
    ) -> Result<Vec<(ManagedService, ServiceStatus)>, AgentError> {
        let units = self.resolve_units(target)?;
        let mut statuses = Vec::with_capacity(units.len());
        for (service, unit) in units {
            statuses.push((service, self.query_status(service, unit).await));
        }
        Ok(statuses)
    }

    fn resolve_units(
        &self,
        target: ServiceTarget,
    ) -> Result<Vec<(ManagedService, &'static str)>, AgentError> {
        target
            .services()
            .into_iter()
            .map(|svc| registry::native_name(self.platform.family, svc).map(|unit| (svc, unit)))
            .collect()
    }

    async fn control_one(
        &self,
        service: ManagedService,
        unit: &str,
        action: ControlAction,
    ) -> Result<(), AgentError> {
        info!("{:?} {} ({} unit {})", action, service, self.backend.name(), unit);
        for command in self.backend.control_commands(action, unit) {
            if let Err(e) = self.run_checked(&command).await {
                warn!("{:?} {} failed: {}", action, service, e);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn query_status(&self, service: ManagedService, unit: &str) -> ServiceStatus {
        let command = self.backend.status_command(unit);
        match self.runner.run(&command).await {
            Ok(output) => {
                let status = self.backend.classify_status(unit, &output);
                debug!("{} status: {}", service, status);
                status
            }
            Err(e) => {
                warn!("status query for {} failed: {}", service, e);
                ServiceStatus::Unknown
            }
        }
    }

    async fn run_checked(&self, command: &CommandSpec) -> Result<(), AgentError> {
        let output = self.runner.run(command).await?;
        if output.success() {
            Ok(())
        } else {
            Err(AgentError::CommandFailed {
                command: command.to_string(),
                exit: output.exit_info(),
                output: output.output.trim().to_string(),
            })
        }
    }
}
