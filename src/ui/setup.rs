//! Console rendition of the setup wizard.
//!
//! Walks the wizard pages, collecting the plan, then follows the run's
//! event stream and prints the summary.

use std::io::{BufRead, Write};

use crossbeam::channel::Receiver;

use super::console::Console;
use super::{AppState, NavError, Page};
use crate::agent::service::StartType;
use crate::error::{ManagerError, Result};
use crate::install::{Action, InstallPlan, RunEvent, RunOutcome, RunReport};

const LICENSE_NOTICE: &str = "Beszel is distributed under the MIT License.\n\
The full text is available at https://github.com/henrygd/beszel/blob/main/LICENSE";

pub struct SetupWizard<R, W> {
    console: Console<R, W>,
}

impl<R: BufRead, W: Write> SetupWizard<R, W> {
    pub fn new(console: Console<R, W>) -> Self {
        SetupWizard { console }
    }

    /// Prompts page by page until the user confirms the overview.
    /// `None` means setup was abandoned.
    pub fn collect(&mut self, state: &mut AppState) -> Result<Option<InstallPlan>> {
        loop {
            let c = &mut self.console;
            c.say(&format!("\n== {} ==", state.page()))?;

            match state.page() {
                Page::Welcome => {
                    c.say("This wizard installs, updates or removes the Beszel monitoring agent.")?;
                }
                Page::License => {
                    c.say(LICENSE_NOTICE)?;
                    let accepted = c.confirm("Do you accept the license terms")?;
                    state.accept_license(accepted);
                    if !accepted {
                        c.say("Setup cannot continue without accepting the license.")?;
                        return Ok(None);
                    }
                }
                Page::Choice => {
                    let options: Vec<String> = Action::ALL.iter().map(|a| a.to_string()).collect();
                    let current = Action::ALL
                        .iter()
                        .position(|a| *a == state.plan.action())
                        .unwrap_or(0);
                    let chosen = c.choose("What would you like to do?", &options, current)?;
                    state.plan.set_action(Action::ALL[chosen]);
                }
                Page::Key => {
                    let key = c.prompt("Access key (public key from the Beszel hub)")?;
                    state.plan.set_access_key(key);
                }
                Page::ServiceSettings => {
                    let current = state.plan.install_dir().display().to_string();
                    let dir = c.prompt_default("Install directory", &current)?;
                    state.plan.set_install_dir(dir);

                    let options: Vec<String> = StartType::CHOICES.iter().map(|s| s.to_string()).collect();
                    let current = StartType::CHOICES
                        .iter()
                        .position(|s| *s == state.plan.start_type())
                        .unwrap_or(0);
                    let chosen = c.choose("Service start type", &options, current)?;
                    state.plan.set_start_type(StartType::CHOICES[chosen]);
                }
                Page::EnvVars => loop {
                    let name = c.prompt("Extra environment variable name (empty to finish)")?;
                    if name.is_empty() {
                        break;
                    }
                    let value = c.prompt(&format!("Value for {name}"))?;
                    if !state.plan.add_env_var(&name, &value) {
                        c.say("Name and value must both be non-empty; entry ignored.")?;
                    }
                },
                Page::Overview => {
                    self.print_overview(state)?;
                    if self.console.confirm("Proceed")? {
                        match state.begin_run() {
                            Ok(plan) => return Ok(Some(plan)),
                            Err(e) => {
                                self.console.say(&format!("Cannot start: {e}"))?;
                                state.back().map_err(nav)?;
                            }
                        }
                    } else {
                        state.back().map_err(nav)?;
                    }
                    continue;
                }
                Page::Run | Page::Summary => return Ok(None),
            }

            if let Err(e) = state.next() {
                self.console.say(&e.to_string())?;
            }
        }
    }

    fn print_overview(&mut self, state: &AppState) -> Result<()> {
        let plan = &state.plan;
        let c = &mut self.console;
        c.say(&format!("Action:            {}", plan.action()))?;
        c.say(&format!("Install directory: {}", plan.install_dir().display()))?;
        if plan.action() == Action::Install {
            c.say(&format!("Start type:        {}", plan.start_type()))?;
            c.say("Access key:        (set)")?;
            for (name, value) in plan.extra_env() {
                c.say(&format!("Environment:       {name}={value}"))?;
            }
        }
        Ok(())
    }

    /// Prints progress until the run reports completion, then shows the
    /// summary page.
    pub fn follow(&mut self, state: &mut AppState, events: &Receiver<RunEvent>) -> Result<RunReport> {
        for event in events.iter() {
            match event {
                RunEvent::Log(line) => self.console.say(&line)?,
                RunEvent::Stage { stage, percent } => {
                    self.console.say(&format!("[{percent:>3}%] {stage}"))?
                }
                RunEvent::Finished(report) => {
                    state.finish_run(report.clone());
                    self.print_summary(&report)?;
                    return Ok(report);
                }
            }
        }
        Err(ManagerError::Worker(
            "run ended without a report".to_string(),
        ))
    }

    fn print_summary(&mut self, report: &RunReport) -> Result<()> {
        let c = &mut self.console;
        c.say(&format!("\n== {} ==", Page::Summary))?;
        match &report.outcome {
            RunOutcome::Succeeded => c.say(&format!("{} completed successfully.", report.action))?,
            RunOutcome::Failed { stage, error } => {
                let stage = stage.map(|s| s.to_string()).unwrap_or_else(|| "startup".to_string());
                c.say(&format!("{} failed during {stage}: {error}", report.action))?;
            }
        }
        if let Some(service) = &report.service {
            c.say(&format!("Service status: {}", service.status))?;
        }
        if let Some(version) = &report.installed_version {
            c.say(&format!("Installed version: {version}"))?;
        }
        for warning in &report.warnings {
            c.say(&format!("Warning: {warning}"))?;
        }
        if let Some(path) = &report.log_path {
            c.say(&format!("Log file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn nav(e: NavError) -> ManagerError {
    ManagerError::Plan(e.to_string())
}
