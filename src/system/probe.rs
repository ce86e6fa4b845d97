//! Read-only view of the installed agent: service state, install path,
//! installed version and service parameters.
//!
//! Nothing here returns an error. Every failure degrades to `Unknown` or
//! `None` so a broken or missing installation can still be displayed.

use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::agent::service::{ServiceRecord, ServiceStatus, StartType};
use crate::agent::{APPLICATION_VALUE, INSTALLED_VERSION_VALUE};
use crate::system::process::CommandRunner;
use crate::system::registry::{service_parameters_key, Registry};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Reachability of the agent's listening port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Connected,
    NotReachable,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Connection::Connected => "Connected",
            Connection::NotReachable => "Not reachable",
        })
    }
}

#[derive(Clone)]
pub struct SystemProbe {
    runner: Arc<dyn CommandRunner>,
}

impl SystemProbe {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        SystemProbe { runner }
    }

    /// Queries the service controller and the wrapper's registry entry.
    ///
    /// # Arguments
    ///
    /// * `name` - Service name, e.g. "beszel-agent"
    ///
    /// # Returns
    ///
    /// A record whose fields fall back to `Unknown` or `None` when the
    /// corresponding query fails, including when the service is missing.
    pub fn probe_service(&self, name: &str) -> ServiceRecord {
        ServiceRecord {
            name: name.to_string(),
            status: self.probe_status(name),
            start_type: self.probe_start_type(name),
            install_path: self.probe_install_path(name),
        }
    }

    pub fn probe_status(&self, name: &str) -> ServiceStatus {
        match self.runner.run("sc", &["query", name]) {
            Ok(output) => ServiceStatus::from_sc_output(&output.stdout),
            Err(e) => {
                warn!("Service status query failed: {}", e);
                ServiceStatus::Unknown
            }
        }
    }

    pub fn probe_start_type(&self, name: &str) -> StartType {
        match self.runner.run("sc", &["qc", name]) {
            Ok(output) => StartType::from_sc_output(&output.stdout),
            Err(e) => {
                warn!("Service config query failed: {}", e);
                StartType::Unknown
            }
        }
    }

    /// Agent executable registered with the service wrapper, with
    /// environment placeholders expanded.
    pub fn probe_install_path(&self, name: &str) -> Option<PathBuf> {
        let registry = Registry::new(self.runner.as_ref());
        let value = registry.query_value(&service_parameters_key(name), APPLICATION_VALUE)?;
        let path = value.resolved();
        if path.is_empty() {
            return None;
        }
        Some(PathBuf::from(path))
    }

    /// All values under the service parameters key, resolved for display.
    pub fn probe_environment(&self, name: &str) -> Vec<(String, String)> {
        let registry = Registry::new(self.runner.as_ref());
        match registry.list_values(&service_parameters_key(name)) {
            Some(values) => values
                .into_iter()
                .map(|value| {
                    let resolved = value.resolved();
                    (value.name, resolved)
                })
                .collect(),
            None => {
                debug!("Parameters key for {} not found", name);
                Vec::new()
            }
        }
    }

    /// Version recorded at install time, falling back to asking the agent
    /// binary itself.
    pub fn probe_installed_version(&self, name: &str, agent_exe: Option<&Path>) -> Option<String> {
        let registry = Registry::new(self.runner.as_ref());
        if let Some(value) =
            registry.query_value(&service_parameters_key(name), INSTALLED_VERSION_VALUE)
        {
            let version = value.resolved();
            if !version.trim().is_empty() {
                return Some(version.trim().to_string());
            }
        }

        self.probe_binary_version(agent_exe?)
    }

    /// Asks the agent binary for its version with `--version`.
    pub fn probe_binary_version(&self, exe: &Path) -> Option<String> {
        if !exe.is_file() {
            return None;
        }
        let output = match self.runner.run(&exe.to_string_lossy(), &["--version"]) {
            Ok(output) => output,
            Err(e) => {
                debug!("Agent --version failed: {}", e);
                return None;
            }
        };
        let text = output.stdout.trim();
        if text.to_lowercase().contains("version") {
            Some(extract_version(text).unwrap_or(text).to_string())
        } else {
            None
        }
    }

    pub fn test_connection(port: u16) -> Connection {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(_) => Connection::Connected,
            Err(e) => {
                debug!("Agent port {} not reachable: {}", port, e);
                Connection::NotReachable
            }
        }
    }
}

/// First whitespace-separated token shaped like `1.2.3` or `v1.2.3`.
pub fn extract_version(text: &str) -> Option<&str> {
    text.split_whitespace().find(|token| {
        let digits = token.strip_prefix('v').unwrap_or(token);
        digits.contains('.')
            && digits.starts_with(|c: char| c.is_ascii_digit())
            && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    fn probe(host: &Arc<FakeHost>) -> SystemProbe {
        SystemProbe::new(host.clone())
    }

    #[test]
    fn missing_service_probes_as_unknown() {
        let host = Arc::new(FakeHost::new());
        let record = probe(&host).probe_service("beszelagent");

        assert_eq!(record.status, ServiceStatus::Unknown);
        assert_eq!(record.start_type, StartType::Unknown);
        assert_eq!(record.install_path, None);
    }

    #[test]
    fn registered_service_is_probed() {
        let host = Arc::new(FakeHost::new());
        host.register_service("beszelagent", r"C:\agent\beszel-agent.exe");
        host.set_running("beszelagent", true);

        let record = probe(&host).probe_service("beszelagent");
        assert_eq!(record.status, ServiceStatus::Running);
        assert_eq!(record.start_type, StartType::Automatic);
        assert_eq!(
            record.install_path,
            Some(PathBuf::from(r"C:\agent\beszel-agent.exe"))
        );
    }

    #[test]
    fn expandable_install_path_is_expanded() {
        let host = Arc::new(FakeHost::new());
        std::env::set_var("BESZEL_PROBE_TEST_ROOT", "D:\\Tools");
        host.set_registry_value(
            &service_parameters_key("beszelagent"),
            APPLICATION_VALUE,
            "REG_EXPAND_SZ",
            "%BESZEL_PROBE_TEST_ROOT%\\beszel-agent.exe",
        );

        let path = probe(&host).probe_install_path("beszelagent");
        assert_eq!(path, Some(PathBuf::from("D:\\Tools\\beszel-agent.exe")));
    }

    #[test]
    fn installed_version_comes_from_registry() {
        let host = Arc::new(FakeHost::new());
        host.set_registry_value(
            &service_parameters_key("beszelagent"),
            INSTALLED_VERSION_VALUE,
            "REG_SZ",
            "0.16.1",
        );

        let version = probe(&host).probe_installed_version("beszelagent", None);
        assert_eq!(version.as_deref(), Some("0.16.1"));
    }

    #[test]
    fn installed_version_falls_back_to_agent_binary() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("beszel-agent.exe");
        std::fs::write(&exe, b"binary").unwrap();

        let host = Arc::new(FakeHost::new());
        host.set_agent_version_output("beszel-agent version 0.15.4\n");

        let version = probe(&host).probe_installed_version("beszelagent", Some(&exe));
        assert_eq!(version.as_deref(), Some("0.15.4"));
    }

    #[test]
    fn installed_version_unknown_without_registry_or_binary() {
        let host = Arc::new(FakeHost::new());
        let version = probe(&host)
            .probe_installed_version("beszelagent", Some(Path::new("/nonexistent/agent.exe")));
        assert_eq!(version, None);
    }

    #[test]
    fn environment_lists_parameter_values() {
        let host = Arc::new(FakeHost::new());
        host.register_service("beszelagent", r"C:\agent\beszel-agent.exe");
        host.set_registry_value(
            &service_parameters_key("beszelagent"),
            "AppEnvironmentExtra",
            "REG_MULTI_SZ",
            "KEY=abc123",
        );

        let env = probe(&host).probe_environment("beszelagent");
        assert!(env.contains(&(
            "Application".to_string(),
            r"C:\agent\beszel-agent.exe".to_string()
        )));
        assert!(env.contains(&("AppEnvironmentExtra".to_string(), "KEY=abc123".to_string())));
    }

    #[test]
    fn environment_of_missing_key_is_empty() {
        let host = Arc::new(FakeHost::new());
        assert!(probe(&host).probe_environment("beszelagent").is_empty());
    }

    #[test]
    fn extracts_version_tokens() {
        assert_eq!(extract_version("beszel-agent version 0.17.0"), Some("0.17.0"));
        assert_eq!(extract_version("version v0.9.1 (windows)"), Some("v0.9.1"));
        assert_eq!(extract_version("version unknown"), None);
    }

    #[test]
    fn closed_port_is_not_reachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert_eq!(SystemProbe::test_connection(port), Connection::Connected);
        drop(listener);
        assert_eq!(SystemProbe::test_connection(port), Connection::NotReachable);
    }
}
