use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed locations searched when no `--config` is given, in order
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./config/config.json",
    "/etc/ss-agent/config/config.json",
    "/usr/local/etc/ss-agent/config/config.json",
    "/usr/local/ss-agent/config/config.json",
    r"C:\ProgramData\ss-agent\config\config.json",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the controller API (e.g., https://siem.example.com/api)
    #[serde(default)]
    pub api_url: String,

    #[serde(default)]
    pub organization_key: String,

    #[serde(default)]
    pub api_access_key: String,

    #[serde(default)]
    pub api_secret_key: String,

    /// Client certificate (PEM), used together with `key_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,

    /// Client private key (PKCS#8 PEM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,

    /// Extra CA bundle (PEM) trusted for the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<String>,

    /// Heartbeat interval in seconds (raised to the scheduler's floor)
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,

    #[serde(default)]
    pub skip_ssl_verify: bool,

    /// Override of the platform PID file location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<PathBuf>,

    /// Override of the platform log file used by `start --daemon`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Upper bound on any service-manager or package-manager invocation
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Prefix Linux package-manager and systemctl control calls with sudo
    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,
}

fn default_ping_interval() -> u64 {
    5
}
fn default_command_timeout() -> u64 {
    120
}
fn default_use_sudo() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            organization_key: String::new(),
            api_access_key: String::new(),
            api_secret_key: String::new(),
            cert_file: None,
            key_file: None,
            ca_file: None,
            ping_interval: default_ping_interval(),
            skip_ssl_verify: false,
            pid_file: None,
            log_file: None,
            command_timeout_secs: default_command_timeout(),
            use_sudo: default_use_sudo(),
        }
    }
}

impl AgentConfig {
    /// Candidate config locations: the fixed system paths, then the per-user
    /// config directory.
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect();
        if let Some(dirs) = directories::ProjectDirs::from("com", "ss-agent", "agent") {
            paths.push(dirs.config_dir().join("config.json"));
        }
        paths
    }

    /// First default path that exists
    pub fn find_default() -> Option<PathBuf> {
        Self::default_paths().into_iter().find(|p| p.exists())
    }

    /// Load config from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config JSON in {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise from the first default location.
    /// Returns the config together with the file it came from.
    pub fn load_from(path: Option<&Path>) -> Result<(Self, PathBuf)> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::find_default()
                .context("no config file found in default paths")?,
        };
        let config = Self::load(&path)?;
        Ok((config, path))
    }

    pub fn pid_file_path(&self) -> PathBuf {
        self.pid_file.clone().unwrap_or_else(default_pid_file)
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(default_log_file)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }

    /// Non-empty path setting, since the controller's provisioning writes
    /// `""` for unused TLS files.
    pub fn tls_path(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Explicit field listing for `--debug` output; secrets are redacted.
    pub fn diagnostic_fields(&self) -> Vec<(&'static str, String)> {
        fn secret(value: &str) -> String {
            if value.is_empty() {
                "<unset>".to_string()
            } else {
                "<redacted>".to_string()
            }
        }
        fn opt(value: &Option<String>) -> String {
            AgentConfig::tls_path(value).unwrap_or("<unset>").to_string()
        }

        vec![
            ("api_url", self.api_url.clone()),
            ("organization_key", self.organization_key.clone()),
            ("api_access_key", secret(&self.api_access_key)),
            ("api_secret_key", secret(&self.api_secret_key)),
            ("cert_file", opt(&self.cert_file)),
            ("key_file", opt(&self.key_file)),
            ("ca_file", opt(&self.ca_file)),
            ("ping_interval", self.ping_interval.to_string()),
            ("skip_ssl_verify", self.skip_ssl_verify.to_string()),
            ("pid_file", self.pid_file_path().display().to_string()),
            ("log_file", self.log_file_path().display().to_string()),
            ("command_timeout_secs", self.command_timeout_secs.to_string()),
            ("use_sudo", self.use_sudo.to_string()),
        ]
    }
}

/// Platform default PID file location
pub fn default_pid_file() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        program_data().join("ss-agent").join("ss-agent.pid")
    }
    #[cfg(not(target_os = "windows"))]
    {
        PathBuf::from("/tmp/ss-agent.pid")
    }
}

/// Platform default log file for daemonized runs
pub fn default_log_file() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        program_data().join("ss-agent").join("logs").join("ss-agent.log")
    }
    #[cfg(target_os = "macos")]
    {
        PathBuf::from("/usr/local/var/log/ss-agent/ss-agent.log")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        PathBuf::from("/var/log/ss-agent/ss-agent.log")
    }
}

#[cfg(target_os = "windows")]
fn program_data() -> PathBuf {
    std::env::var_os("ProgramData")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"api_url": "https://siem.local"}"#).unwrap();
        assert_eq!(config.api_url, "https://siem.local");
        assert_eq!(config.ping_interval, 5);
        assert_eq!(config.command_timeout_secs, 120);
        assert!(config.use_sudo);
        assert!(!config.skip_ssl_verify);
        assert_eq!(config.pid_file_path(), default_pid_file());
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "api_url": "https://siem.local",
            "organization_key": "org-1",
            "api_access_key": "ak",
            "api_secret_key": "sk",
            "cert_file": "",
            "ca_file": "/etc/ss-agent/ca.pem",
            "ping_interval": 30,
            "skip_ssl_verify": true,
            "pid_file": "/run/ss-agent.pid"
        }"#;
        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.ping_interval, 30);
        assert!(config.skip_ssl_verify);
        assert_eq!(config.pid_file_path(), PathBuf::from("/run/ss-agent.pid"));
        assert_eq!(AgentConfig::tls_path(&config.cert_file), None);
        assert_eq!(AgentConfig::tls_path(&config.ca_file), Some("/etc/ss-agent/ca.pem"));
    }

    #[test]
    fn test_diagnostics_redact_secrets() {
        let config = AgentConfig {
            api_url: "https://siem.local".to_string(),
            api_access_key: "access".to_string(),
            ..AgentConfig::default()
        };
        let fields = config.diagnostic_fields();
        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(get("api_url"), "https://siem.local");
        assert_eq!(get("api_access_key"), "<redacted>");
        assert_eq!(get("api_secret_key"), "<unset>");
        assert!(fields.iter().all(|(_, v)| !v.contains("access")));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"api_url": "https://a", "ping_interval": 2}}"#).unwrap();

        let (config, path) = AgentConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(path, file.path());
        assert_eq!(config.ping_interval, 2);
    }

    #[test]
    fn test_load_errors() {
        assert!(AgentConfig::load(Path::new("/nonexistent/ss-agent.json")).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(AgentConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_command_timeout_never_zero() {
        let config = AgentConfig { command_timeout_secs: 0, ..AgentConfig::default() };
        assert_eq!(config.command_timeout(), Duration::from_secs(1));
    }
}
