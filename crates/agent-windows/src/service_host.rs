//! Runs the agent under the Service Control Manager.
//!
//! SCM stop and shutdown requests cancel the token handed to the entry point;
//! the entry point returns once the supervised run has wound down.

use std::ffi::OsString;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
    ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult};
use windows_service::{define_windows_service, service_dispatcher};

pub const SERVICE_NAME: &str = "ss-agent";

type EntryPoint = Box<dyn Fn(CancellationToken) -> Result<()> + Send + Sync>;

static ENTRY: OnceLock<EntryPoint> = OnceLock::new();

define_windows_service!(ffi_service_main, service_main);

/// Hand the calling thread to the SCM dispatcher. Blocks until the service
/// has stopped. Fails when the process was not launched by the SCM.
pub fn run<F>(entry: F) -> Result<()>
where
    F: Fn(CancellationToken) -> Result<()> + Send + Sync + 'static,
{
    ENTRY
        .set(Box::new(entry))
        .map_err(|_| anyhow::anyhow!("service entry point already registered"))?;

    service_dispatcher::start(SERVICE_NAME, ffi_service_main)
        .context("failed to connect to the service control manager")
}

fn service_main(_arguments: Vec<OsString>) {
    if let Err(e) = run_service() {
        error!("service run failed: {:#}", e);
    }
}

fn run_service() -> Result<()> {
    let shutdown = CancellationToken::new();
    let handler_token = shutdown.clone();

    let event_handler = move |control| -> ServiceControlHandlerResult {
        match control {
            ServiceControl::Stop | ServiceControl::Shutdown => {
                info!("stop requested by service control manager");
                handler_token.cancel();
                ServiceControlHandlerResult::NoError
            }
            ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
            other => {
                warn!("unexpected control request: {:?}", other);
                ServiceControlHandlerResult::NotImplemented
            }
        }
    };

    let status_handle = service_control_handler::register(SERVICE_NAME, event_handler)
        .context("failed to register service control handler")?;

    let accepts = ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN;
    status_handle
        .set_service_status(status(ServiceState::Running, accepts, 0))
        .context("failed to report running state")?;

    let entry = ENTRY
        .get()
        .context("service entry point not registered")?;
    let result = entry(shutdown);

    let exit_code = if result.is_ok() { 0 } else { 1 };
    let stopped = status(ServiceState::Stopped, ServiceControlAccept::empty(), exit_code);
    status_handle
        .set_service_status(stopped)
        .context("failed to report stopped state")?;

    result
}

fn status(state: ServiceState, accepts: ServiceControlAccept, exit_code: u32) -> ServiceStatus {
    ServiceStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state: state,
        controls_accepted: accepts,
        exit_code: ServiceExitCode::Win32(exit_code),
        checkpoint: 0,
        wait_hint: Duration::default(),
        process_id: None,
    }
}
