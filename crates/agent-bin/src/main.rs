use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use agent_core::api::ApiClient;
use agent_core::config::AgentConfig;
use agent_core::heartbeat::Heartbeat;
use agent_core::registry::ServiceTarget;
use agent_platform::platform::PlatformInfo;

mod lifecycle;
mod services;

#[derive(Parser, Debug)]
#[command(name = "ss-agent")]
#[command(
    about = "Host agent for the log shipper, network analyzer and endpoint telemetry services"
)]
#[command(version)]
struct Cli {
    /// Path to config file (default: first existing standard location)
    #[arg(long, env = "SS_AGENT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging plus a dump of the resolved configuration
    #[arg(long, global = true)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SS_AGENT_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the agent
    Start {
        /// Detach and keep running in the background
        #[arg(long)]
        daemon: bool,
    },
    /// Signal the running agent to stop
    Stop,
    /// Report whether the agent is running
    Status,
    /// Send a single heartbeat to the controller
    Ping,
    /// Print the agent version
    Version,
    /// Manage the monitoring services
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },
    /// Entry point used by the Windows service control manager
    #[command(hide = true)]
    RunService,
}

#[derive(Subcommand, Debug)]
enum ServiceCommand {
    /// Install with the platform package manager
    Install { service: ServiceTarget },
    /// Remove with the platform package manager
    Uninstall { service: ServiceTarget },
    Start { service: ServiceTarget },
    Stop { service: ServiceTarget },
    Restart { service: ServiceTarget },
    Status { service: ServiceTarget },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        config,
        debug,
        log_level,
        command,
    } = Cli::parse();

    let level = if debug { "debug" } else { log_level.as_str() };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .with_file(debug)
        .with_line_number(debug)
        .init();

    debug!(
        "ss-agent v{} (os={}, arch={})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    );

    let config_arg = config.as_deref();

    match command {
        Commands::Version => {
            println!("ss-agent v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Status => {
            // no config is fine here: fall back to the default PID file
            let config = match AgentConfig::load_from(config_arg) {
                Ok((config, _)) => config,
                Err(e) => {
                    debug!("using defaults: {:#}", e);
                    AgentConfig::default()
                }
            };
            lifecycle::status(&config);
            Ok(())
        }
        Commands::Stop => {
            let (config, _) = load_config(config_arg, debug)?;
            lifecycle::stop(&config)
        }
        Commands::Start { daemon } => {
            let (config, config_path) = load_config(config_arg, debug)?;
            let platform = PlatformInfo::detect().context("platform detection failed")?;
            info!(
                "ss-agent v{} on {} ({})",
                env!("CARGO_PKG_VERSION"),
                host_name(),
                platform,
            );
            if daemon {
                lifecycle::start_daemon(&config, &config_path, &log_level, debug)
            } else {
                lifecycle::start_foreground(config).await
            }
        }
        Commands::Ping => {
            let (config, _) = load_config(config_arg, debug)?;
            let client = ApiClient::from_config(&config)?;
            client.ping().await?;
            println!("pong");
            Ok(())
        }
        Commands::Service { command } => {
            let (config, _) = load_config(config_arg, debug)?;
            let platform = PlatformInfo::detect().context("platform detection failed")?;
            debug!("platform: {:?}", platform);
            services::run(command, &config, platform).await
        }
        Commands::RunService => {
            let (config, _) = load_config(config_arg, debug)?;
            lifecycle::run_as_service(config).await
        }
    }
}

fn load_config(path: Option<&Path>, debug: bool) -> Result<(AgentConfig, PathBuf)> {
    let (config, path) = AgentConfig::load_from(path)?;
    info!("loaded config from {}", path.display());

    if debug {
        for (name, value) in config.diagnostic_fields() {
            debug!("config {:<22} = {}", name, value);
        }
    }
    Ok((config, path))
}

fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown-host".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use agent_core::registry::ManagedService;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_service_command() {
        let args = ["ss-agent", "--config", "/etc/a.json", "service", "restart", "zeek"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/a.json")));
        match cli.command {
            Commands::Service {
                command: ServiceCommand::Restart { service },
            } => assert_eq!(service, ServiceTarget::One(ManagedService::NetworkAnalyzer)),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_all_and_reject_unknown_service() {
        let cli = Cli::try_parse_from(["ss-agent", "service", "status", "all"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Service { command: ServiceCommand::Status { service: ServiceTarget::All } }
        ));

        assert!(Cli::try_parse_from(["ss-agent", "service", "start", "nginx"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ss-agent", "start", "--daemon", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Start { daemon: true }));
    }

    #[test]
    fn test_service_command_loads_config_from_global_flag() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"api_url": "https://siem.local", "use_sudo": false}}"#).unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::try_parse_from(["ss-agent", "service", "stop", "all", "--config", path])
            .unwrap();
        let Cli { config, command, .. } = cli;

        let (loaded, loaded_from) = load_config(config.as_deref(), true).unwrap();
        assert_eq!(loaded_from, file.path());
        assert_eq!(loaded.api_url, "https://siem.local");
        assert!(!loaded.use_sudo);
        assert!(matches!(
            command,
            Commands::Service { command: ServiceCommand::Stop { service: ServiceTarget::All } }
        ));
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/ss-agent.json")), false).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/ss-agent.json"));
    }
}
