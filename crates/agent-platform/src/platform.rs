//! OS family and Linux distribution detection.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    Darwin,
    Windows,
}

impl OsFamily {
    /// Family of the host this binary runs on.
    pub fn current() -> Result<Self, PlatformError> {
        match std::env::consts::OS {
            "linux" => Ok(OsFamily::Linux),
            "macos" => Ok(OsFamily::Darwin),
            "windows" => Ok(OsFamily::Windows),
            other => Err(PlatformError::UnsupportedOs(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Darwin => "darwin",
            OsFamily::Windows => "windows",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistributionFamily {
    DebianLike,
    RhelLike,
    MacOs,
    Windows,
    Unsupported,
}

impl DistributionFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionFamily::DebianLike => "debian-like",
            DistributionFamily::RhelLike => "rhel-like",
            DistributionFamily::MacOs => "macos",
            DistributionFamily::Windows => "windows",
            DistributionFamily::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for DistributionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("failed to read {}: {source}", .path.display())]
    OsRelease {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("os-release descriptor has no ID field")]
    MissingId,
}

/// Host platform, computed once at startup and passed to whoever needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub family: OsFamily,
    pub distribution: DistributionFamily,
    /// Raw os-release `ID` (Linux only)
    pub distribution_id: Option<String>,
    /// Raw os-release `VERSION_ID` (Linux only)
    pub distribution_version: Option<String>,
}

impl PlatformInfo {
    pub fn new(family: OsFamily, distribution: DistributionFamily) -> Self {
        Self {
            family,
            distribution,
            distribution_id: None,
            distribution_version: None,
        }
    }

    /// Detect the host platform.
    ///
    /// On Linux an unreadable or ID-less os-release file is an error. An
    /// unrecognized distribution is not: it is reported as
    /// [`DistributionFamily::Unsupported`] and only rejected once a
    /// distribution-specific action is attempted.
    pub fn detect() -> Result<Self, PlatformError> {
        Self::detect_with(Path::new(OS_RELEASE_PATH))
    }

    pub fn detect_with(os_release: &Path) -> Result<Self, PlatformError> {
        match OsFamily::current()? {
            OsFamily::Linux => {
                let content =
                    std::fs::read_to_string(os_release).map_err(|source| PlatformError::OsRelease {
                        path: os_release.to_path_buf(),
                        source,
                    })?;
                Self::from_os_release(&content)
            }
            OsFamily::Darwin => Ok(Self::new(OsFamily::Darwin, DistributionFamily::MacOs)),
            OsFamily::Windows => Ok(Self::new(OsFamily::Windows, DistributionFamily::Windows)),
        }
    }

    /// Build a Linux platform from the contents of an os-release file.
    pub fn from_os_release(content: &str) -> Result<Self, PlatformError> {
        let release = OsRelease::parse(content);
        let id = release.get("ID").ok_or(PlatformError::MissingId)?;

        let mut distribution = classify_distribution(id);
        if distribution == DistributionFamily::Unsupported {
            if let Some(like) = release.get("ID_LIKE") {
                distribution = like
                    .split_whitespace()
                    .map(classify_distribution)
                    .find(|d| *d != DistributionFamily::Unsupported)
                    .unwrap_or(DistributionFamily::Unsupported);
            }
        }

        Ok(Self {
            family: OsFamily::Linux,
            distribution,
            distribution_id: Some(id.to_string()),
            distribution_version: release
                .get("VERSION_ID")
                .or_else(|| release.get("VERSION"))
                .map(str::to_string),
        })
    }

    /// Distribution name for messages: the raw ID on Linux, the family elsewhere.
    pub fn distribution_name(&self) -> &str {
        self.distribution_id
            .as_deref()
            .unwrap_or_else(|| self.distribution.as_str())
    }
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family, self.distribution)
    }
}

fn classify_distribution(id: &str) -> DistributionFamily {
    match id.to_ascii_lowercase().as_str() {
        "ubuntu" | "debian" | "mint" | "linuxmint" | "pop" | "raspbian" => {
            DistributionFamily::DebianLike
        }
        "fedora" | "rhel" | "centos" | "rocky" | "almalinux" | "amzn" | "ol" => {
            DistributionFamily::RhelLike
        }
        _ => DistributionFamily::Unsupported,
    }
}

/// `KEY=value` pairs of an os-release file.
#[derive(Debug, Default)]
pub struct OsRelease {
    fields: HashMap<String, String>,
}

impl OsRelease {
    pub fn parse(content: &str) -> Self {
        let fields = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| {
                let v = v.trim().trim_matches('"').trim_matches('\'');
                (k.trim().to_string(), v.to_string())
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UBUNTU: &str = r#"PRETTY_NAME="Ubuntu 22.04.4 LTS"
NAME="Ubuntu"
VERSION_ID="22.04"
VERSION="22.04.4 LTS (Jammy Jellyfish)"
ID=ubuntu
ID_LIKE=debian
"#;

    #[test]
    fn test_ubuntu_is_debian_like() {
        let info = PlatformInfo::from_os_release(UBUNTU).unwrap();
        assert_eq!(info.family, OsFamily::Linux);
        assert_eq!(info.distribution, DistributionFamily::DebianLike);
        assert_eq!(info.distribution_id.as_deref(), Some("ubuntu"));
        assert_eq!(info.distribution_version.as_deref(), Some("22.04"));
        assert_eq!(info.to_string(), "linux/debian-like");
    }

    #[test]
    fn test_rhel_family() {
        for id in ["fedora", "rhel", "centos", "\"rocky\""] {
            let content = format!("ID={}\nVERSION_ID=9\n", id);
            let info = PlatformInfo::from_os_release(&content).unwrap();
            assert_eq!(info.distribution, DistributionFamily::RhelLike, "id {}", id);
        }
    }

    #[test]
    fn test_id_like_fallback() {
        let content = "ID=elementary\nID_LIKE=\"ubuntu debian\"\n";
        let info = PlatformInfo::from_os_release(content).unwrap();
        assert_eq!(info.distribution, DistributionFamily::DebianLike);
        assert_eq!(info.distribution_name(), "elementary");
    }

    #[test]
    fn test_unknown_distribution_is_unsupported_not_error() {
        let info = PlatformInfo::from_os_release("ID=arch\n").unwrap();
        assert_eq!(info.distribution, DistributionFamily::Unsupported);
    }

    #[test]
    fn test_missing_id_is_error() {
        let err = PlatformInfo::from_os_release("NAME=\"Mystery\"\n# ID=none\n").unwrap_err();
        assert!(matches!(err, PlatformError::MissingId));
    }

    #[test]
    fn test_parse_skips_comments_and_garbage() {
        let release = OsRelease::parse("# comment\n\nnot a pair\nID='debian'\n");
        assert_eq!(release.get("ID"), Some("debian"));
        assert_eq!(release.get("not a pair"), None);
    }

    #[test]
    fn test_distribution_name_outside_linux() {
        let info = PlatformInfo::new(OsFamily::Darwin, DistributionFamily::MacOs);
        assert_eq!(info.distribution_name(), "macos");
        assert_eq!(info.to_string(), "darwin/macos");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_detect_with_unreadable_file_fails() {
        let err = PlatformInfo::detect_with(Path::new("/nonexistent/os-release")).unwrap_err();
        assert!(matches!(err, PlatformError::OsRelease { .. }));
    }
}
