//! Control panel commands against the installed agent.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use log::info;

use super::alerts::{AlertType, Notifier};
use super::monitor::StatusSnapshot;
use crate::agent::config::Config;
use crate::agent::service::ServiceControl;
use crate::error::{ManagerError, Result};
use crate::install::{Action, HostPaths, Orchestrator, PlanBuilder, RunOutcome, RunReport};
use crate::release::ReleaseFeed;
use crate::system::probe::{Connection, SystemProbe};
use crate::system::process::{CommandOutput, CommandRunner};
use crate::version::VersionVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    Restart,
    Update,
    Environment,
    OpenDir,
    TestConnection,
    Refresh,
    Help,
    Quit,
}

impl FromStr for ControlCommand {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_lowercase().as_str() {
            "start" => ControlCommand::Start,
            "stop" => ControlCommand::Stop,
            "restart" => ControlCommand::Restart,
            "update" => ControlCommand::Update,
            "env" | "environment" => ControlCommand::Environment,
            "open" => ControlCommand::OpenDir,
            "test" => ControlCommand::TestConnection,
            "refresh" | "" => ControlCommand::Refresh,
            "help" | "?" => ControlCommand::Help,
            "quit" | "exit" | "q" => ControlCommand::Quit,
            other => return Err(ManagerError::Config(format!("unknown command `{other}`"))),
        })
    }
}

pub const HELP: &str = "Commands: start, stop, restart, update, env, open, test, refresh, help, quit";

pub struct ControlPanel {
    config: Config,
    runner: Arc<dyn CommandRunner>,
    feed: Arc<dyn ReleaseFeed>,
    notifier: Arc<dyn Notifier>,
    paths: HostPaths,
}

impl ControlPanel {
    pub fn new(
        config: Config,
        runner: Arc<dyn CommandRunner>,
        feed: Arc<dyn ReleaseFeed>,
        notifier: Arc<dyn Notifier>,
        paths: HostPaths,
    ) -> Self {
        ControlPanel {
            config,
            runner,
            feed,
            notifier,
            paths,
        }
    }

    fn service_name(&self) -> &str {
        &self.config.service.name
    }

    fn probe(&self) -> SystemProbe {
        SystemProbe::new(self.runner.clone())
    }

    fn install_dir(&self) -> Option<PathBuf> {
        self.probe()
            .probe_install_path(self.service_name())
            .and_then(|exe| exe.parent().map(PathBuf::from))
    }

    /// Runs one command and returns the text to show. `Quit` and `Refresh`
    /// are handled by the caller.
    pub fn execute(&self, command: ControlCommand) -> Result<String> {
        let control = ServiceControl::new(self.runner.as_ref(), self.service_name());
        match command {
            ControlCommand::Start => self.service_action("start", control.start()),
            ControlCommand::Stop => self.service_action("stop", control.stop()),
            ControlCommand::Restart => self.service_action("restart", control.restart()),
            ControlCommand::Update => {
                let report = self.update()?;
                Ok(match report.outcome {
                    RunOutcome::Succeeded => {
                        self.notifier
                            .notify(AlertType::Info, "Update", "Beszel Agent updated successfully.");
                        "Update completed".to_string()
                    }
                    RunOutcome::Failed { error, .. } => {
                        format!("Update failed: {error}")
                    }
                })
            }
            ControlCommand::Environment => Ok(self.environment()),
            ControlCommand::OpenDir => {
                let dir = self
                    .install_dir()
                    .ok_or_else(|| ManagerError::NotFound(self.config.service.install_dir.clone()))?;
                self.runner.run("explorer", &[&dir.to_string_lossy()])?;
                Ok(format!("Opened {}", dir.display()))
            }
            ControlCommand::TestConnection => {
                let port = self.config.service.agent_port;
                let result = SystemProbe::test_connection(port);
                let text = format!("Agent port {port}: {result}");
                let kind = match result {
                    Connection::Connected => AlertType::Info,
                    Connection::NotReachable => AlertType::Warning,
                };
                self.notifier.notify(kind, "Connection test", &text);
                Ok(text)
            }
            ControlCommand::Refresh | ControlCommand::Help | ControlCommand::Quit => {
                Ok(HELP.to_string())
            }
        }
    }

    fn service_action(
        &self,
        verb: &str,
        result: Result<CommandOutput>,
    ) -> Result<String> {
        let output = result?;
        if output.success() {
            info!("Service {} succeeded", verb);
            Ok(format!("Service {verb} requested"))
        } else {
            let message = format!("Failed to {verb} service: {}", output.combined());
            self.notifier.notify(AlertType::Error, "Service error", &message);
            Err(ManagerError::command("sc", message))
        }
    }

    /// Runs the update flow on a worker thread and waits for it.
    pub fn update(&self) -> Result<RunReport> {
        let mut builder = PlanBuilder::new(
            self.install_dir()
                .unwrap_or_else(|| self.config.service.install_dir.clone()),
        );
        builder.set_action(Action::Update);
        let plan = builder.build()?;

        let orchestrator = Orchestrator::new(
            plan,
            self.config.clone(),
            self.paths.clone(),
            self.runner.clone(),
            self.feed.clone(),
            self.notifier.clone(),
        );
        orchestrator.spawn()?.join()
    }

    pub fn environment(&self) -> String {
        let values = self.probe().probe_environment(self.service_name());
        if values.is_empty() {
            return "No service parameters found".to_string();
        }
        let mut out = String::new();
        for (name, value) in values {
            let _ = writeln!(out, "{name} = {}", value.replace('\n', "; "));
        }
        out
    }
}

pub fn render_snapshot(snapshot: &StatusSnapshot) -> String {
    let verdict = match (snapshot.version.latest.as_ref(), snapshot.verdict()) {
        (None, _) => "Failed to check for updates".to_string(),
        (_, VersionVerdict::UpdateAvailable) => format!("Update available: {}", snapshot.latest_label()),
        (_, verdict) => verdict.to_string(),
    };
    format!(
        "[{}] Service: {} ({}) | Installed: {} | Latest: {} | {}",
        snapshot.taken_at.format("%H:%M:%S"),
        snapshot.service.status,
        snapshot.service.start_type,
        snapshot.installed_label(),
        snapshot.latest_label(),
        verdict
    )
}
