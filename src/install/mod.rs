//! Install, uninstall and update runs.
//!
//! An [`Orchestrator`] executes one [`InstallPlan`] as a fixed sequence of
//! [`Stage`]s. Progress, log lines and the final [`RunReport`] are published
//! as [`RunEvent`]s so a front end can follow the run from another thread.
//! A terminal failure halts the run: it is logged, shown to the user and
//! reported, with no rollback of earlier stages.

pub mod archive;
pub mod oplog;
pub mod plan;

mod deploy;
mod remove;
mod upgrade;

use std::fmt;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::Sender;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::agent::config::Config;
use crate::agent::service::ServiceRecord;
use crate::agent::{CONTROL_CENTER_EXE, CONTROL_PANEL_BUILD_EXE};
use crate::error::{ManagerError, Result};
use crate::release::ReleaseFeed;
use crate::system::process::CommandRunner;
use crate::ui::alerts::{AlertType, Notifier};

pub use oplog::OperationLog;
pub use plan::{Action, InstallPlan, PlanBuilder};

/// Downloaded release archive, relative to the downloads directory.
pub const DOWNLOAD_ARCHIVE_NAME: &str = "beszel-agent.zip";
/// Scratch extraction directory, relative to the downloads directory.
pub const EXTRACT_DIR_NAME: &str = "beszel-agent-extracted";

const UNINSTALL_LOG_NAME: &str = "beszel-agent-uninstall.log";
const UPDATE_LOG_NAME: &str = "beszel-agent-update.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PreparePrereqs,
    Download,
    Extract,
    PlaceBinary,
    RegisterService,
    Configure,
    Start,
    Verify,
    StopService,
    RemoveServiceDef,
    RemoveFiles,
    ResolveInstallDir,
    RunUpdater,
    Finalize,
}

impl Stage {
    pub const INSTALL: &'static [Stage] = &[
        Stage::PreparePrereqs,
        Stage::Download,
        Stage::Extract,
        Stage::PlaceBinary,
        Stage::RegisterService,
        Stage::Configure,
        Stage::Start,
        Stage::Verify,
        Stage::Finalize,
    ];

    pub const UNINSTALL: &'static [Stage] = &[
        Stage::StopService,
        Stage::RemoveServiceDef,
        Stage::RemoveFiles,
        Stage::Finalize,
    ];

    pub const UPDATE: &'static [Stage] =
        &[Stage::ResolveInstallDir, Stage::RunUpdater, Stage::Finalize];

    pub fn sequence(action: Action) -> &'static [Stage] {
        match action {
            Action::Install => Stage::INSTALL,
            Action::Uninstall => Stage::UNINSTALL,
            Action::Update => Stage::UPDATE,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::PreparePrereqs => "Preparing prerequisites",
            Stage::Download => "Downloading agent",
            Stage::Extract => "Extracting archive",
            Stage::PlaceBinary => "Installing agent binary",
            Stage::RegisterService => "Registering service",
            Stage::Configure => "Configuring service",
            Stage::Start => "Starting service",
            Stage::Verify => "Verifying installation",
            Stage::StopService => "Stopping service",
            Stage::RemoveServiceDef => "Removing service",
            Stage::RemoveFiles => "Removing files",
            Stage::ResolveInstallDir => "Locating installation",
            Stage::RunUpdater => "Running agent updater",
            Stage::Finalize => "Finishing",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed { stage: Option<Stage>, error: String },
}

/// Everything a front end needs to render the summary page.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub action: Action,
    pub outcome: RunOutcome,
    /// Stages entered, in order.
    pub stages: Vec<Stage>,
    pub warnings: Vec<String>,
    pub log_path: Option<PathBuf>,
    pub log_lines: Vec<String>,
    /// Service as probed at the end of an install.
    pub service: Option<ServiceRecord>,
    pub installed_version: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    Log(String),
    Stage { stage: Stage, percent: u8 },
    Finished(RunReport),
}

/// Per-user and per-process locations used by a run.
#[derive(Debug, Clone)]
pub struct HostPaths {
    pub downloads_dir: PathBuf,
    pub desktop_dir: Option<PathBuf>,
    /// Control panel executable shipped next to the installer.
    pub control_panel_source: Option<PathBuf>,
    /// The running installer, copied into the install directory.
    pub installer_exe: Option<PathBuf>,
    /// Where uninstall and update logs go.
    pub log_dir: PathBuf,
}

impl HostPaths {
    pub fn detect() -> Self {
        let user_dirs = directories::UserDirs::new();
        let downloads_dir = user_dirs
            .as_ref()
            .and_then(|dirs| dirs.download_dir().map(PathBuf::from))
            .unwrap_or_else(std::env::temp_dir);
        let desktop_dir = user_dirs
            .as_ref()
            .and_then(|dirs| dirs.desktop_dir().map(PathBuf::from));

        let installer_exe = std::env::current_exe().ok();
        let control_panel_source = installer_exe
            .as_ref()
            .and_then(|exe| exe.parent())
            .and_then(|dir| {
                [CONTROL_CENTER_EXE, CONTROL_PANEL_BUILD_EXE]
                    .iter()
                    .map(|name| dir.join(name))
                    .find(|path| path.is_file())
            });

        HostPaths {
            downloads_dir,
            desktop_dir,
            control_panel_source,
            installer_exe,
            log_dir: std::env::temp_dir(),
        }
    }
}

/// Mutable state threaded through the stages of one run.
pub(crate) struct RunContext {
    pub(crate) log: OperationLog,
    events: Option<Sender<RunEvent>>,
    cancel: CancellationToken,
    sequence: &'static [Stage],
    stages: Vec<Stage>,
    warnings: Vec<String>,
    pub(crate) service: Option<ServiceRecord>,
    pub(crate) installed_version: Option<String>,
}

impl RunContext {
    fn new(
        log: OperationLog,
        action: Action,
        events: Option<Sender<RunEvent>>,
        cancel: CancellationToken,
    ) -> Self {
        RunContext {
            log,
            events,
            cancel,
            sequence: Stage::sequence(action),
            stages: Vec::new(),
            warnings: Vec::new(),
            service: None,
            installed_version: None,
        }
    }

    /// Marks `stage` as current. Fails when the run has been cancelled.
    pub(crate) fn enter(&mut self, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ManagerError::Cancelled);
        }
        self.stages.push(stage);

        let position = self
            .sequence
            .iter()
            .position(|s| *s == stage)
            .map_or(self.stages.len(), |i| i + 1);
        let percent = (position * 100 / self.sequence.len().max(1)).min(100) as u8;

        self.log.append(&format!("{stage}..."));
        if let Some(events) = &self.events {
            let _ = events.send(RunEvent::Stage { stage, percent });
        }
        Ok(())
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.log.warn(&message);
        self.warnings.push(message);
    }

    pub(crate) fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    fn current_stage(&self) -> Option<Stage> {
        self.stages.last().copied()
    }
}

/// Runs one plan against injected host collaborators.
pub struct Orchestrator {
    plan: InstallPlan,
    config: Config,
    paths: HostPaths,
    runner: Arc<dyn CommandRunner>,
    feed: Arc<dyn ReleaseFeed>,
    notifier: Arc<dyn Notifier>,
    events: Option<Sender<RunEvent>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        plan: InstallPlan,
        config: Config,
        paths: HostPaths,
        runner: Arc<dyn CommandRunner>,
        feed: Arc<dyn ReleaseFeed>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Orchestrator {
            plan,
            config,
            paths,
            runner,
            feed,
            notifier,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: Sender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn log_path(&self) -> PathBuf {
        match self.plan.action() {
            Action::Install => self.plan.install_log(),
            Action::Uninstall => self.paths.log_dir.join(UNINSTALL_LOG_NAME),
            Action::Update => self.paths.log_dir.join(UPDATE_LOG_NAME),
        }
    }

    /// Executes the plan on the calling thread.
    ///
    /// Progress goes to the operation log and to the event channel given to
    /// [`Orchestrator::with_events`]. Cancelling the token stops the run at
    /// the next stage boundary or during a download.
    ///
    /// # Returns
    ///
    /// A [`RunReport`] whose outcome is one of:
    ///
    /// * `RunOutcome::Succeeded` - Every stage completed
    /// * `RunOutcome::Failed` - The failing stage and its error; earlier
    ///   stages are not rolled back
    pub fn run(&self) -> RunReport {
        let action = self.plan.action();
        info!("Starting run: {}", action);

        let log = OperationLog::open_or_memory(&self.log_path(), self.events.clone());
        let mut ctx = RunContext::new(log, action, self.events.clone(), self.cancel.clone());

        let result = match action {
            Action::Install => deploy::run(self, &mut ctx),
            Action::Uninstall => remove::run(self, &mut ctx),
            Action::Update => upgrade::run(self, &mut ctx),
        };

        let outcome = match result {
            Ok(()) => RunOutcome::Succeeded,
            Err(e) => {
                let stage = ctx.current_stage();
                let message = match stage {
                    Some(stage) => format!("{stage} failed: {e}"),
                    None => e.to_string(),
                };
                ctx.log.error(&message);
                self.notifier
                    .notify(AlertType::Error, action.error_title(), &message);
                RunOutcome::Failed {
                    stage,
                    error: e.to_string(),
                }
            }
        };

        let report = RunReport {
            action,
            outcome,
            log_path: ctx.log.path().map(PathBuf::from),
            log_lines: ctx.log.lines(),
            stages: ctx.stages,
            warnings: ctx.warnings,
            service: ctx.service,
            installed_version: ctx.installed_version,
        };

        if let Some(events) = &self.events {
            let _ = events.send(RunEvent::Finished(report.clone()));
        }
        report
    }

    /// Executes the plan on a dedicated worker thread.
    pub fn spawn(self) -> Result<RunHandle> {
        let cancel = self.cancel.clone();
        let join = thread::Builder::new()
            .name("beszel-orchestrator".to_string())
            .spawn(move || self.run())?;
        Ok(RunHandle { cancel, join })
    }
}

pub struct RunHandle {
    cancel: CancellationToken,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    /// Requests cancellation. Takes effect at the next stage boundary or
    /// download chunk.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the run when `interrupt` completes, e.g. on
    /// `tokio::signal::ctrl_c()`.
    ///
    /// The future is polled on a small current-thread runtime of its own.
    /// Watching stops when the returned guard is dropped.
    ///
    /// # Arguments
    ///
    /// * `interrupt` - Future that resolves with `Ok(())` when the user asks
    ///   to abort; an `Err` is logged and ignored
    ///
    /// # Returns
    ///
    /// * `Ok(InterruptGuard)` - The watcher thread is running
    /// * `Err(ManagerError::Io)` - The runtime or thread could not be started
    pub fn cancel_on<F>(&self, interrupt: F) -> Result<InterruptGuard>
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let cancel = self.cancel.clone();
        let stop = CancellationToken::new();
        let stopped = stop.clone();

        let watcher = thread::Builder::new()
            .name("beszel-interrupt".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    tokio::select! {
                        result = interrupt => match result {
                            Ok(()) => {
                                warn!("Interrupt received, cancelling run");
                                cancel.cancel();
                            }
                            Err(e) => warn!("Cannot listen for interrupts: {}", e),
                        },
                        _ = stopped.cancelled() => {}
                    }
                });
            })?;

        Ok(InterruptGuard {
            stop,
            watcher: Some(watcher),
        })
    }

    pub fn join(self) -> Result<RunReport> {
        self.join
            .join()
            .map_err(|_| ManagerError::Worker("orchestrator thread panicked".to_string()))
    }
}

/// Keeps an interrupt watcher alive; dropping it stops the watcher.
pub struct InterruptGuard {
    stop: CancellationToken,
    watcher: Option<JoinHandle<()>>,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_sequence_lists_every_stage_in_order() {
        assert_eq!(
            Stage::sequence(Action::Install),
            &[
                Stage::PreparePrereqs,
                Stage::Download,
                Stage::Extract,
                Stage::PlaceBinary,
                Stage::RegisterService,
                Stage::Configure,
                Stage::Start,
                Stage::Verify,
                Stage::Finalize,
            ]
        );
    }

    #[test]
    fn uninstall_removes_service_before_files() {
        let seq = Stage::sequence(Action::Uninstall);
        let def = seq.iter().position(|s| *s == Stage::RemoveServiceDef).unwrap();
        let files = seq.iter().position(|s| *s == Stage::RemoveFiles).unwrap();
        assert!(def < files);
    }

    #[test]
    fn progress_reaches_one_hundred_on_finalize() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let mut ctx = RunContext::new(
            OperationLog::in_memory(None),
            Action::Update,
            Some(tx),
            CancellationToken::new(),
        );
        for stage in Stage::UPDATE {
            ctx.enter(*stage).unwrap();
        }

        let percents: Vec<u8> = rx
            .try_iter()
            .filter_map(|event| match event {
                RunEvent::Stage { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![33, 66, 100]);
    }

    #[test]
    fn cancelled_context_refuses_next_stage() {
        let cancel = CancellationToken::new();
        let mut ctx = RunContext::new(
            OperationLog::in_memory(None),
            Action::Install,
            None,
            cancel.clone(),
        );
        ctx.enter(Stage::PreparePrereqs).unwrap();
        cancel.cancel();

        assert!(matches!(ctx.enter(Stage::Download), Err(ManagerError::Cancelled)));
        assert_eq!(ctx.current_stage(), Some(Stage::PreparePrereqs));
    }
}
