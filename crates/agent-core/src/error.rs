//! Errors surfaced by service control and process supervision.

use std::path::PathBuf;

use agent_platform::command::{CommandError, ExitInfo};
use agent_platform::platform::PlatformError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// No command table entry for this OS family.
    #[error("unsupported operating system: {0}")]
    UnsupportedPlatform(String),

    /// Linux distribution outside the known families.
    #[error("unsupported distribution: {0}")]
    UnsupportedDistribution(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    /// The command ran and exited non-zero.
    #[error("`{command}` failed with {exit}\nOutput: {output}")]
    CommandFailed {
        command: String,
        exit: ExitInfo,
        output: String,
    },

    /// The command could not be started or timed out.
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("agent already running (PID {pid}, PID file: {})", .path.display())]
    AlreadyRunning { pid: u32, path: PathBuf },

    #[error("failed to read PID file {}: {reason}", .path.display())]
    PidFileUnreadable { path: PathBuf, reason: String },

    #[error("failed to write PID file {}: {reason}", .path.display())]
    PidFileWrite { path: PathBuf, reason: String },

    #[error("failed to signal process {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    #[error("failed to start background process: {0}")]
    Daemonize(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// At least one service of an `all` fan-out failed.
    #[error("failed to {action}: {}", .failed.join(", "))]
    PartialFailure { action: String, failed: Vec<String> },
}
