//! The agent's Windows service: state model, `sc` output tables, and the
//! `sc` / NSSM command wrappers that change it.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ManagerError, Result};
use crate::system::process::{CommandOutput, CommandRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Running,
    Stopped,
    Paused,
    StartPending,
    StopPending,
    Unknown,
}

/// `sc query` state names in match order. The first substring found in the
/// upper-cased output wins.
pub const STATUS_TABLE: &[(&str, ServiceStatus)] = &[
    ("RUNNING", ServiceStatus::Running),
    ("STOPPED", ServiceStatus::Stopped),
    ("PAUSED", ServiceStatus::Paused),
    ("START_PENDING", ServiceStatus::StartPending),
    ("STOP_PENDING", ServiceStatus::StopPending),
];

impl ServiceStatus {
    pub fn from_sc_output(output: &str) -> Self {
        match_table(STATUS_TABLE, output).unwrap_or(ServiceStatus::Unknown)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ServiceStatus::Running => "Running",
            ServiceStatus::Stopped => "Stopped",
            ServiceStatus::Paused => "Paused",
            ServiceStatus::StartPending => "Starting…",
            ServiceStatus::StopPending => "Stopping…",
            ServiceStatus::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StartType {
    #[default]
    Automatic,
    AutomaticDelayed,
    Manual,
    Disabled,
    Unknown,
}

/// `sc qc` start types in match order. Both delayed spellings must come
/// before `AUTO_START`, which they contain.
pub const START_TYPE_TABLE: &[(&str, StartType)] = &[
    ("DELAYED_AUTO_START", StartType::AutomaticDelayed),
    ("AUTO_START  (DELAYED)", StartType::AutomaticDelayed),
    ("AUTO_START", StartType::Automatic),
    ("DEMAND_START", StartType::Manual),
    ("DISABLED", StartType::Disabled),
];

impl StartType {
    pub fn from_sc_output(output: &str) -> Self {
        match_table(START_TYPE_TABLE, output).unwrap_or(StartType::Unknown)
    }

    /// Value for `nssm set <service> Start`. `Unknown` has no mapping.
    pub fn nssm_value(self) -> Option<&'static str> {
        match self {
            StartType::Automatic => Some("SERVICE_AUTO_START"),
            StartType::AutomaticDelayed => Some("SERVICE_DELAYED_AUTO_START"),
            StartType::Manual => Some("SERVICE_DEMAND_START"),
            StartType::Disabled => Some("SERVICE_DISABLED"),
            StartType::Unknown => None,
        }
    }

    pub const CHOICES: [StartType; 4] = [
        StartType::Automatic,
        StartType::AutomaticDelayed,
        StartType::Manual,
        StartType::Disabled,
    ];
}

impl fmt::Display for StartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StartType::Automatic => "Automatic",
            StartType::AutomaticDelayed => "Automatic (Delayed)",
            StartType::Manual => "Manual",
            StartType::Disabled => "Disabled",
            StartType::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

fn match_table<T: Copy>(table: &[(&str, T)], output: &str) -> Option<T> {
    let upper = output.to_uppercase();
    table
        .iter()
        .find(|(needle, _)| upper.contains(needle))
        .map(|(_, value)| *value)
}

/// A service as seen by one probe. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub status: ServiceStatus,
    pub start_type: StartType,
    /// Agent executable the service definition points at.
    pub install_path: Option<PathBuf>,
}

impl ServiceRecord {
    /// Directory holding the agent executable.
    pub fn install_dir(&self) -> Option<&Path> {
        self.install_path.as_deref().and_then(Path::parent)
    }
}

/// Start and stop through the service control manager (`sc`).
pub struct ServiceControl<'a> {
    runner: &'a dyn CommandRunner,
    name: &'a str,
}

impl<'a> ServiceControl<'a> {
    pub fn new(runner: &'a dyn CommandRunner, name: &'a str) -> Self {
        ServiceControl { runner, name }
    }

    pub fn start(&self) -> Result<CommandOutput> {
        info!("Starting service {}", self.name);
        self.runner.run("sc", &["start", self.name])
    }

    pub fn stop(&self) -> Result<CommandOutput> {
        info!("Stopping service {}", self.name);
        self.runner.run("sc", &["stop", self.name])
    }

    pub fn restart(&self) -> Result<CommandOutput> {
        let stop = self.stop()?;
        if !stop.success() {
            warn!("Stopping {} before restart failed: {}", self.name, stop.combined());
        }
        self.start()
    }
}

/// The NSSM service wrapper, used to define the service around the plain
/// agent executable.
pub struct Nssm<'a> {
    runner: &'a dyn CommandRunner,
    exe: &'a Path,
    service: &'a str,
}

impl<'a> Nssm<'a> {
    pub fn new(runner: &'a dyn CommandRunner, exe: &'a Path, service: &'a str) -> Self {
        Nssm { runner, exe, service }
    }

    pub fn is_present(&self) -> bool {
        self.exe.is_file()
    }

    fn call(&self, args: &[&str]) -> Result<CommandOutput> {
        let program = self.exe.to_string_lossy();
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(args[0]);
        full.push(self.service);
        full.extend_from_slice(&args[1..]);
        self.runner.run(&program, &full)
    }

    pub fn install(&self, binary: &Path) -> Result<CommandOutput> {
        let binary = binary.to_string_lossy();
        self.call(&["install", &binary])
    }

    pub fn set(&self, parameter: &str, value: &str) -> Result<()> {
        let output = self.call(&["set", parameter, value])?;
        if output.success() {
            Ok(())
        } else {
            Err(ManagerError::command("nssm", output.combined()))
        }
    }

    pub fn set_start_type(&self, start_type: StartType) -> Result<()> {
        match start_type.nssm_value() {
            Some(value) => self.set("Start", value),
            None => Err(ManagerError::Plan(format!(
                "start type {start_type} cannot be applied"
            ))),
        }
    }

    pub fn stop(&self) -> Result<CommandOutput> {
        self.call(&["stop"])
    }

    /// Removes the service definition without prompting.
    pub fn remove(&self) -> Result<CommandOutput> {
        self.call(&["remove", "confirm"])
    }
}
