use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agent_core::api::ApiClient;
use agent_core::config::AgentConfig;
use agent_core::heartbeat::HeartbeatScheduler;
use agent_core::supervisor::{AgentStatus, DaemonLaunch, Supervisor};

/// Relaunch ourselves in the background with the foreground `start` verb.
pub fn start_daemon(
    config: &AgentConfig,
    config_path: &Path,
    log_level: &str,
    debug: bool,
) -> Result<()> {
    let supervisor = Supervisor::new(config.pid_file_path());
    let program = std::env::current_exe().context("failed to get current exe")?;
    let config_path =
        std::fs::canonicalize(config_path).unwrap_or_else(|_| config_path.to_path_buf());

    let mut args = vec![
        "start".to_string(),
        "--config".to_string(),
        config_path.display().to_string(),
        "--log-level".to_string(),
        log_level.to_string(),
    ];
    if debug {
        args.push("--debug".to_string());
    }

    let launch = DaemonLaunch {
        program,
        args,
        log_file: config.log_file_path(),
    };
    let pid = supervisor.daemonize(&launch)?;
    println!("ss-agent started in background (PID {})", pid);
    Ok(())
}

/// Run until SIGINT/SIGTERM (Ctrl-C on Windows).
pub async fn start_foreground(config: AgentConfig) -> Result<()> {
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_token.cancel();
    });

    run_agent(config, shutdown).await
}

async fn run_agent(config: AgentConfig, shutdown: CancellationToken) -> Result<()> {
    let supervisor = Supervisor::new(config.pid_file_path());
    supervisor.ensure_not_running()?;

    let api = Arc::new(ApiClient::from_config(&config)?);
    let scheduler = HeartbeatScheduler::from_secs(config.ping_interval);

    supervisor.run_foreground(scheduler, api, shutdown).await?;
    Ok(())
}

pub fn stop(config: &AgentConfig) -> Result<()> {
    let supervisor = Supervisor::new(config.pid_file_path());
    let pid = supervisor.stop()?;
    println!("stop signal sent to ss-agent (PID {})", pid);
    Ok(())
}

/// Prints exactly `running` or `stopped`; the PID goes to the log.
pub fn status(config: &AgentConfig) {
    println!("{}", agent_status(config));
}

fn agent_status(config: &AgentConfig) -> AgentStatus {
    let status = Supervisor::new(config.pid_file_path()).status();
    if let AgentStatus::Running { pid } = status {
        info!("agent running with PID {}", pid);
    }
    status
}

/// Hand control to the service control manager; SCM stop requests cancel
/// the agent's shutdown token.
#[cfg(target_os = "windows")]
pub async fn run_as_service(config: AgentConfig) -> Result<()> {
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || {
        agent_windows::service_host::run(move |shutdown| {
            handle.block_on(run_agent(config.clone(), shutdown))
        })
    })
    .await
    .context("service host thread panicked")?
}

#[cfg(not(target_os = "windows"))]
pub async fn run_as_service(_config: AgentConfig) -> Result<()> {
    anyhow::bail!("run-service is only available on Windows; use `start --daemon`")
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("received Ctrl-C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_pid_file(path: &Path) -> AgentConfig {
        AgentConfig {
            pid_file: Some(path.to_path_buf()),
            ..AgentConfig::default()
        }
    }

    #[test]
    fn test_status_without_pid_file_is_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_pid_file(&dir.path().join("ss-agent.pid"));

        let status = agent_status(&config);
        assert_eq!(status, AgentStatus::Stopped);
        assert_eq!(status.to_string(), "stopped");
    }

    #[test]
    fn test_status_with_garbage_pid_file_is_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ss-agent.pid");
        std::fs::write(&path, "not-a-pid\n").unwrap();

        assert_eq!(agent_status(&config_with_pid_file(&path)).to_string(), "stopped");
    }

    #[cfg(unix)]
    #[test]
    fn test_status_of_live_process_is_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ss-agent.pid");
        let parent = std::os::unix::process::parent_id();
        std::fs::write(&path, parent.to_string()).unwrap();

        let status = agent_status(&config_with_pid_file(&path));
        assert_eq!(status, AgentStatus::Running { pid: parent });
        assert_eq!(status.to_string(), "running");
    }
}
