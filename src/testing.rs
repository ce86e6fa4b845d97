//! In-memory Windows host for tests.
//!
//! [`FakeHost`] answers the commands the manager issues (`sc`, `reg`,
//! `nssm`, `choco`, `powershell`, the agent binary) from a small state
//! model, and records every invocation so tests can assert on ordering.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::agent::service::StartType;
use crate::agent::APPLICATION_VALUE;
use crate::error::{ManagerError, Result};
use crate::system::process::{CommandOutput, CommandRunner};
use crate::system::registry::service_parameters_key;
use crate::ui::alerts::{Notice, Notifier};

#[derive(Debug, Clone)]
struct FakeService {
    running: bool,
    start_type: StartType,
}

#[derive(Debug, Default)]
struct HostState {
    calls: Vec<String>,
    services: HashMap<String, FakeService>,
    /// Lower-cased key path → ordered (name, kind, data).
    registry: BTreeMap<String, Vec<(String, String, String)>>,
    firewall_rules: Vec<String>,
    choco_installed: bool,
    choco_install_fails: bool,
    nssm_path: Option<PathBuf>,
    start_fails: bool,
    admin: bool,
    update_exit_code: i32,
    agent_version_output: String,
}

#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn fail(code: i32, stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.into(),
    }
}

impl FakeHost {
    pub fn new() -> Self {
        FakeHost::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut HostState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Chocolatey is already installed. `choco install nssm` creates a
    /// file at `nssm_path`.
    pub fn with_choco(self, installed: bool) -> Self {
        self.with_state(|s| s.choco_installed = installed);
        self
    }

    pub fn with_nssm_at(self, path: &Path) -> Self {
        self.with_state(|s| s.nssm_path = Some(path.to_path_buf()));
        self
    }

    /// `net session` succeeds, as for an elevated process.
    pub fn with_admin(self, admin: bool) -> Self {
        self.with_state(|s| s.admin = admin);
        self
    }

    pub fn failing_choco_install(self) -> Self {
        self.with_state(|s| s.choco_install_fails = true);
        self
    }

    pub fn failing_service_start(self) -> Self {
        self.with_state(|s| s.start_fails = true);
        self
    }

    pub fn set_update_exit_code(&self, code: i32) {
        self.with_state(|s| s.update_exit_code = code);
    }

    pub fn set_agent_version_output(&self, output: &str) {
        self.with_state(|s| s.agent_version_output = output.to_string());
    }

    pub fn register_service(&self, name: &str, exe: &str) {
        self.with_state(|s| {
            s.services.insert(
                name.to_string(),
                FakeService {
                    running: false,
                    start_type: StartType::Automatic,
                },
            );
            set_value(s, &service_parameters_key(name), APPLICATION_VALUE, "REG_EXPAND_SZ", exe);
        });
    }

    pub fn set_running(&self, name: &str, running: bool) {
        self.with_state(|s| {
            if let Some(service) = s.services.get_mut(name) {
                service.running = running;
            }
        });
    }

    pub fn set_registry_value(&self, key: &str, name: &str, kind: &str, data: &str) {
        self.with_state(|s| set_value(s, key, name, kind, data));
    }

    pub fn registry_value(&self, key: &str, name: &str) -> Option<String> {
        self.with_state(|s| {
            s.registry.get(&key.to_lowercase()).and_then(|values| {
                values
                    .iter()
                    .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
                    .map(|(_, _, data)| data.clone())
            })
        })
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.with_state(|s| s.services.contains_key(name))
    }

    pub fn start_type(&self, name: &str) -> Option<StartType> {
        self.with_state(|s| s.services.get(name).map(|svc| svc.start_type))
    }

    pub fn add_firewall_rule(&self, name: &str) {
        self.with_state(|s| s.firewall_rules.push(name.to_string()));
    }

    pub fn firewall_rules(&self) -> Vec<String> {
        self.with_state(|s| s.firewall_rules.clone())
    }

    /// Every invocation as `program arg1 arg2 ...`, program reduced to its
    /// lower-cased file stem.
    pub fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn call_index(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|call| call.starts_with(prefix))
    }

    fn dispatch(&self, tool: &str, args: &[&str]) -> Result<CommandOutput> {
        self.with_state(|s| match tool {
            "sc" => Ok(sc(s, args)),
            "reg" => Ok(reg(s, args)),
            "nssm" => Ok(nssm(s, args)),
            "choco" => choco(s, args),
            "powershell" => Ok(powershell(s, args)),
            "explorer" => Ok(ok("")),
            "net" if s.admin => Ok(ok("There are no entries in the list.")),
            "net" => Ok(fail(2, "System error 5 has occurred.\n\nAccess is denied.")),
            _ if tool.starts_with("beszel-agent") => Ok(ok(s.agent_version_output.clone())),
            other => Err(ManagerError::command(other, "program not found")),
        })
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let tool = tool_name(program);
        self.with_state(|s| s.calls.push(format!("{} {}", tool, args.join(" "))));
        self.dispatch(&tool, args)
    }
}

fn tool_name(program: &str) -> String {
    // Windows paths are handled on every platform.
    let file = program.rsplit(['\\', '/']).next().unwrap_or(program);
    let lower = file.to_lowercase();
    lower.strip_suffix(".exe").unwrap_or(&lower).to_string()
}

fn set_value(s: &mut HostState, key: &str, name: &str, kind: &str, data: &str) {
    let values = s.registry.entry(key.to_lowercase()).or_default();
    match values.iter_mut().find(|(n, _, _)| n.eq_ignore_ascii_case(name)) {
        Some(entry) => *entry = (name.to_string(), kind.to_string(), data.to_string()),
        None => values.push((name.to_string(), kind.to_string(), data.to_string())),
    }
}

fn sc(s: &mut HostState, args: &[&str]) -> CommandOutput {
    let (verb, name) = match args {
        [verb, name, ..] => (*verb, *name),
        _ => return fail(1, "usage"),
    };
    let start_fails = s.start_fails;
    let Some(service) = s.services.get_mut(name) else {
        return fail(1060, "[SC] OpenService FAILED 1060:\n\nThe specified service does not exist as an installed service.");
    };
    match verb {
        "query" => {
            let state = if service.running { "4  RUNNING" } else { "1  STOPPED" };
            ok(format!(
                "\nSERVICE_NAME: {name}\n        TYPE               : 10  WIN32_OWN_PROCESS\n        STATE              : {state}\n"
            ))
        }
        "qc" => {
            let start = match service.start_type {
                StartType::Automatic => "2   AUTO_START",
                StartType::AutomaticDelayed => "2   AUTO_START  (DELAYED)",
                StartType::Manual => "3   DEMAND_START",
                StartType::Disabled => "4   DISABLED",
                StartType::Unknown => "?",
            };
            ok(format!(
                "[SC] QueryServiceConfig SUCCESS\n\nSERVICE_NAME: {name}\n        START_TYPE         : {start}\n"
            ))
        }
        "start" if start_fails || service.start_type == StartType::Disabled => {
            fail(1058, "[SC] StartService FAILED 1058")
        }
        "start" => {
            service.running = true;
            ok(format!("\nSERVICE_NAME: {name}\n        STATE              : 2  START_PENDING\n"))
        }
        "stop" => {
            service.running = false;
            ok(format!("\nSERVICE_NAME: {name}\n        STATE              : 3  STOP_PENDING\n"))
        }
        _ => fail(1, "unsupported"),
    }
}

fn reg(s: &mut HostState, args: &[&str]) -> CommandOutput {
    match args {
        ["query", key, "/v", name] => {
            let found = s.registry.get(&key.to_lowercase()).and_then(|values| {
                values
                    .iter()
                    .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
                    .cloned()
            });
            match found {
                Some((n, kind, data)) => ok(format!("\r\n{key}\r\n    {n}    {kind}    {data}\r\n\r\n")),
                None => fail(1, "ERROR: The system was unable to find the specified registry key or value."),
            }
        }
        ["query", key] => match s.registry.get(&key.to_lowercase()) {
            Some(values) => {
                let mut out = format!("\r\n{key}\r\n");
                for (n, kind, data) in values {
                    out.push_str(&format!("    {n}    {kind}    {data}\r\n"));
                }
                ok(out)
            }
            None => fail(1, "ERROR: The system was unable to find the specified registry key or value."),
        },
        ["add", key, "/v", name, "/t", kind, "/d", data, "/f"] => {
            set_value(s, key, name, kind, data);
            ok("The operation completed successfully.")
        }
        _ => fail(1, "ERROR: Invalid syntax."),
    }
}

fn nssm(s: &mut HostState, args: &[&str]) -> CommandOutput {
    match args {
        ["install", name, exe] => {
            if s.services.contains_key(*name) {
                return fail(5, "Error creating service!\nCreateService(): The specified service already exists.");
            }
            s.services.insert(
                name.to_string(),
                FakeService {
                    running: false,
                    start_type: StartType::Automatic,
                },
            );
            set_value(s, &service_parameters_key(name), APPLICATION_VALUE, "REG_EXPAND_SZ", exe);
            ok(format!("Service \"{name}\" installed successfully!"))
        }
        ["set", name, "Start", value] => {
            let start_type = match *value {
                "SERVICE_AUTO_START" => StartType::Automatic,
                "SERVICE_DELAYED_AUTO_START" => StartType::AutomaticDelayed,
                "SERVICE_DEMAND_START" => StartType::Manual,
                "SERVICE_DISABLED" => StartType::Disabled,
                _ => return fail(1, "Invalid start type"),
            };
            match s.services.get_mut(*name) {
                Some(service) => {
                    service.start_type = start_type;
                    ok(format!("Set parameter \"Start\" for service \"{name}\" to \"{value}\"."))
                }
                None => fail(3, "Can't open service!"),
            }
        }
        ["set", name, parameter, value] => {
            if !s.services.contains_key(*name) {
                return fail(3, "Can't open service!");
            }
            set_value(s, &service_parameters_key(name), parameter, "REG_MULTI_SZ", value);
            ok(format!("Set parameter \"{parameter}\" for service \"{name}\"."))
        }
        ["stop", name] => match s.services.get_mut(*name) {
            Some(service) => {
                service.running = false;
                ok(format!("{name}: STOP: The operation completed successfully."))
            }
            None => fail(3, "Can't open service!"),
        },
        ["remove", name, "confirm"] => {
            if s.services.remove(*name).is_none() {
                return fail(3, "Can't open service!");
            }
            s.registry.remove(&service_parameters_key(name).to_lowercase());
            ok(format!("Service \"{name}\" removed successfully!"))
        }
        _ => fail(1, "nssm: unsupported"),
    }
}

fn choco(s: &mut HostState, args: &[&str]) -> Result<CommandOutput> {
    if !s.choco_installed {
        return Err(ManagerError::command("choco", "program not found"));
    }
    match args {
        ["-v"] => Ok(ok("2.2.2")),
        ["install", "nssm", "-y"] => {
            if let Some(path) = &s.nssm_path {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, b"nssm")?;
            }
            Ok(ok("Chocolatey installed 1/1 packages."))
        }
        _ => Ok(fail(1, "choco: unsupported")),
    }
}

fn powershell(s: &mut HostState, args: &[&str]) -> CommandOutput {
    let script = args.last().copied().unwrap_or_default();
    if script.contains("install.ps1") {
        if s.choco_install_fails {
            return fail(1, "The remote name could not be resolved: 'community.chocolatey.org'");
        }
        s.choco_installed = true;
        return ok("Chocolatey (choco.exe) is now ready.");
    }
    if script.contains("Get-NetFirewallRule") {
        let listing = s
            .firewall_rules
            .iter()
            .filter(|rule| script.contains(rule.as_str()))
            .map(|rule| format!("DisplayName : {rule}\n"))
            .collect::<String>();
        return ok(listing);
    }
    if script.contains("New-NetFirewallRule") {
        if let Some(start) = script.find("-DisplayName '") {
            let rest = &script[start + "-DisplayName '".len()..];
            if let Some(end) = rest.find('\'') {
                s.firewall_rules.push(rest[..end].to_string());
            }
        }
        return ok("");
    }
    if script.contains(" update") {
        let code = s.update_exit_code;
        return CommandOutput {
            code: Some(code),
            stdout: "Checking for updates...".to_string(),
            stderr: if code == 0 { String::new() } else { "update failed".to_string() },
        };
    }
    // -File <script>, e.g. the desktop shortcut helper.
    ok("")
}

/// Collects notifications instead of showing them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        RecordingNotifier::default()
    }

    pub fn alerts(&self) -> Vec<Notice> {
        match self.alerts.lock() {
            Ok(alerts) => alerts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn titles(&self) -> Vec<String> {
        self.alerts().into_iter().map(|alert| alert.title).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn deliver(&self, notice: &Notice) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(notice.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_are_normalised() {
        assert_eq!(tool_name(r"C:\ProgramData\chocolatey\bin\nssm.exe"), "nssm");
        assert_eq!(tool_name("/tmp/x/beszel-agent.exe"), "beszel-agent");
        assert_eq!(tool_name("SC"), "sc");
    }

    #[test]
    fn nssm_install_then_remove_round_trips_registry() {
        let host = FakeHost::new();
        host.run("nssm", &["install", "svc", r"C:\a\agent.exe"]).unwrap();
        let key = service_parameters_key("svc");
        assert_eq!(
            host.registry_value(&key, APPLICATION_VALUE).as_deref(),
            Some(r"C:\a\agent.exe")
        );

        host.run("nssm", &["remove", "svc", "confirm"]).unwrap();
        assert!(!host.has_service("svc"));
        assert_eq!(host.registry_value(&key, APPLICATION_VALUE), None);
    }
}
