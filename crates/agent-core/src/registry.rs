//! The fixed set of managed services and the data tables that map them onto
//! each platform. Supporting another platform or service is a table edit.

use std::fmt;
use std::str::FromStr;

use agent_platform::command::CommandSpec;
use agent_platform::platform::{DistributionFamily, OsFamily, PlatformInfo};

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedService {
    /// Fluent Bit
    LogShipper,
    /// Zeek
    NetworkAnalyzer,
    /// osquery
    EndpointTelemetry,
}

impl ManagedService {
    /// Registry order; fan-out and status tables follow it.
    pub const ALL: [ManagedService; 3] = [
        ManagedService::LogShipper,
        ManagedService::NetworkAnalyzer,
        ManagedService::EndpointTelemetry,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ManagedService::LogShipper => "fluent-bit",
            ManagedService::NetworkAnalyzer => "zeek",
            ManagedService::EndpointTelemetry => "osquery",
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            ManagedService::LogShipper => "log-shipper",
            ManagedService::NetworkAnalyzer => "network-analyzer",
            ManagedService::EndpointTelemetry => "endpoint-telemetry",
        }
    }

    /// Package name; identical across apt, dnf, brew and choco.
    pub fn package(&self) -> &'static str {
        self.name()
    }
}

impl fmt::Display for ManagedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ManagedService {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|svc| svc.name() == wanted || svc.role() == wanted)
            .ok_or_else(|| AgentError::UnknownService(s.to_string()))
    }
}

/// A single service or the whole registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceTarget {
    All,
    One(ManagedService),
}

impl ServiceTarget {
    pub fn services(&self) -> Vec<ManagedService> {
        match self {
            ServiceTarget::All => ManagedService::ALL.to_vec(),
            ServiceTarget::One(svc) => vec![*svc],
        }
    }
}

impl FromStr for ServiceTarget {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(ServiceTarget::All)
        } else {
            s.parse().map(ServiceTarget::One)
        }
    }
}

impl fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceTarget::All => f.write_str("all services"),
            ServiceTarget::One(svc) => write!(f, "{}", svc),
        }
    }
}

// ── Native service identifiers ─────────────────────────────────────────────

const NATIVE_NAMES: &[(OsFamily, ManagedService, &str)] = &[
    (OsFamily::Linux, ManagedService::LogShipper, "fluent-bit"),
    (OsFamily::Linux, ManagedService::NetworkAnalyzer, "zeek"),
    (OsFamily::Linux, ManagedService::EndpointTelemetry, "osqueryd"),
    (OsFamily::Darwin, ManagedService::LogShipper, "homebrew.mxcl.fluent-bit"),
    (OsFamily::Darwin, ManagedService::NetworkAnalyzer, "org.zeek.zeek"),
    (OsFamily::Darwin, ManagedService::EndpointTelemetry, "com.facebook.osqueryd"),
    (OsFamily::Windows, ManagedService::LogShipper, "fluent-bit"),
    (OsFamily::Windows, ManagedService::NetworkAnalyzer, "zeek"),
    (OsFamily::Windows, ManagedService::EndpointTelemetry, "osqueryd"),
];

/// systemd unit, launchd label or SCM service name for `service`.
pub fn native_name(family: OsFamily, service: ManagedService) -> Result<&'static str, AgentError> {
    NATIVE_NAMES
        .iter()
        .find(|(f, s, _)| *f == family && *s == service)
        .map(|(_, _, name)| *name)
        .ok_or_else(|| AgentError::UnsupportedPlatform(family.to_string()))
}

// ── Package managers ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Brew,
    Choco,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageOp {
    Install,
    Uninstall,
}

impl fmt::Display for PackageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageOp::Install => f.write_str("install"),
            PackageOp::Uninstall => f.write_str("uninstall"),
        }
    }
}

struct PackageTemplate {
    program: &'static str,
    install: &'static [&'static str],
    uninstall: &'static [&'static str],
    /// Needs root, so honours the sudo setting
    privileged: bool,
}

const PACKAGE_MANAGERS: &[(OsFamily, DistributionFamily, PackageManager)] = &[
    (OsFamily::Linux, DistributionFamily::DebianLike, PackageManager::Apt),
    (OsFamily::Linux, DistributionFamily::RhelLike, PackageManager::Dnf),
    (OsFamily::Darwin, DistributionFamily::MacOs, PackageManager::Brew),
    (OsFamily::Windows, DistributionFamily::Windows, PackageManager::Choco),
];

impl PackageManager {
    /// Package manager for this platform.
    ///
    /// Linux hosts outside the known distribution families get
    /// `UnsupportedDistribution`; any other gap is `UnsupportedPlatform`.
    pub fn for_platform(platform: &PlatformInfo) -> Result<Self, AgentError> {
        if let Some((_, _, pm)) = PACKAGE_MANAGERS
            .iter()
            .find(|(f, d, _)| *f == platform.family && *d == platform.distribution)
        {
            return Ok(*pm);
        }
        match platform.family {
            OsFamily::Linux => Err(AgentError::UnsupportedDistribution(
                platform.distribution_name().to_string(),
            )),
            other => Err(AgentError::UnsupportedPlatform(other.to_string())),
        }
    }

    fn template(&self) -> PackageTemplate {
        match self {
            PackageManager::Apt => PackageTemplate {
                program: "apt-get",
                install: &["install", "-y"],
                uninstall: &["remove", "-y"],
                privileged: true,
            },
            PackageManager::Dnf => PackageTemplate {
                program: "dnf",
                install: &["install", "-y"],
                uninstall: &["remove", "-y"],
                privileged: true,
            },
            PackageManager::Brew => PackageTemplate {
                program: "brew",
                install: &["install"],
                uninstall: &["uninstall"],
                privileged: false,
            },
            PackageManager::Choco => PackageTemplate {
                program: "choco",
                install: &["install", "-y"],
                uninstall: &["uninstall", "-y"],
                privileged: false,
            },
        }
    }

    pub fn command(&self, op: PackageOp, service: ManagedService, use_sudo: bool) -> CommandSpec {
        let t = self.template();
        let verb = match op {
            PackageOp::Install => t.install,
            PackageOp::Uninstall => t.uninstall,
        };
        let args = verb.iter().copied().chain(std::iter::once(service.package()));
        CommandSpec::new(t.program, args).elevated(t.privileged && use_sudo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux(distribution: DistributionFamily) -> PlatformInfo {
        PlatformInfo::new(OsFamily::Linux, distribution)
    }

    #[test]
    fn test_parse_service_names_and_roles() {
        assert_eq!("fluent-bit".parse::<ManagedService>().unwrap(), ManagedService::LogShipper);
        assert_eq!("Zeek".parse::<ManagedService>().unwrap(), ManagedService::NetworkAnalyzer);
        assert_eq!(
            "endpoint-telemetry".parse::<ManagedService>().unwrap(),
            ManagedService::EndpointTelemetry
        );
        assert!(matches!(
            "nginx".parse::<ManagedService>(),
            Err(AgentError::UnknownService(name)) if name == "nginx"
        ));
    }

    #[test]
    fn test_parse_target() {
        assert_eq!("ALL".parse::<ServiceTarget>().unwrap(), ServiceTarget::All);
        assert_eq!(
            "osquery".parse::<ServiceTarget>().unwrap(),
            ServiceTarget::One(ManagedService::EndpointTelemetry)
        );
        assert_eq!(ServiceTarget::All.services(), ManagedService::ALL.to_vec());
    }

    #[test]
    fn test_every_service_has_a_native_name_everywhere() {
        for family in [OsFamily::Linux, OsFamily::Darwin, OsFamily::Windows] {
            for svc in ManagedService::ALL {
                assert!(native_name(family, svc).is_ok(), "{} on {}", svc, family);
            }
        }
        assert_eq!(
            native_name(OsFamily::Linux, ManagedService::EndpointTelemetry).unwrap(),
            "osqueryd"
        );
        assert_eq!(
            native_name(OsFamily::Darwin, ManagedService::LogShipper).unwrap(),
            "homebrew.mxcl.fluent-bit"
        );
    }

    #[test]
    fn test_package_manager_selection() {
        assert_eq!(
            PackageManager::for_platform(&linux(DistributionFamily::DebianLike)).unwrap(),
            PackageManager::Apt
        );
        assert_eq!(
            PackageManager::for_platform(&linux(DistributionFamily::RhelLike)).unwrap(),
            PackageManager::Dnf
        );
        let darwin = PlatformInfo::new(OsFamily::Darwin, DistributionFamily::MacOs);
        assert_eq!(PackageManager::for_platform(&darwin).unwrap(), PackageManager::Brew);

        let mut arch = linux(DistributionFamily::Unsupported);
        arch.distribution_id = Some("arch".to_string());
        assert!(matches!(
            PackageManager::for_platform(&arch),
            Err(AgentError::UnsupportedDistribution(id)) if id == "arch"
        ));

        let odd = PlatformInfo::new(OsFamily::Windows, DistributionFamily::Unsupported);
        assert!(matches!(
            PackageManager::for_platform(&odd),
            Err(AgentError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn test_package_commands() {
        use ManagedService::*;
        use PackageOp::*;

        let cmd = PackageManager::Apt.command(Install, LogShipper, true);
        assert_eq!(cmd.to_string(), "sudo apt-get install -y fluent-bit");

        let cmd = PackageManager::Dnf.command(Uninstall, NetworkAnalyzer, false);
        assert_eq!(cmd.to_string(), "dnf remove -y zeek");

        let cmd = PackageManager::Brew.command(Install, EndpointTelemetry, true);
        assert_eq!(cmd.to_string(), "brew install osquery");

        let cmd = PackageManager::Choco.command(Uninstall, LogShipper, true);
        assert_eq!(cmd.to_string(), "choco uninstall -y fluent-bit");
    }
}
