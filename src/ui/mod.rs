//! Front ends: the setup wizard and the control panel, plus the shared
//! notification seam and status monitor.

pub mod alerts;
pub mod console;
pub mod control;
pub mod monitor;
pub mod setup;
pub mod wizard;

use std::path::PathBuf;

use crate::install::{PlanBuilder, RunReport};
pub use wizard::{NavError, Page};

#[derive(Debug, Clone, Default)]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Finished(RunReport),
}

/// State of one setup session. Owned by the front end and passed
/// explicitly; nothing here is global.
#[derive(Debug, Clone)]
pub struct AppState {
    pub(crate) page: Page,
    pub plan: PlanBuilder,
    pub(crate) license_accepted: bool,
    pub(crate) run: RunStatus,
}

impl AppState {
    pub fn new(default_install_dir: impl Into<PathBuf>) -> Self {
        AppState {
            page: Page::Welcome,
            plan: PlanBuilder::new(default_install_dir),
            license_accepted: false,
            run: RunStatus::Idle,
        }
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn license_accepted(&self) -> bool {
        self.license_accepted
    }

    pub fn accept_license(&mut self, accepted: bool) {
        self.license_accepted = accepted;
    }

    pub fn run_status(&self) -> &RunStatus {
        &self.run
    }

    pub fn is_running(&self) -> bool {
        matches!(self.run, RunStatus::Running)
    }
}
