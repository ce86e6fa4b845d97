//! Setup wizard page flow.

use std::fmt;

use super::{AppState, RunStatus};
use crate::install::{Action, InstallPlan, RunReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Welcome,
    License,
    Choice,
    Key,
    ServiceSettings,
    EnvVars,
    Overview,
    Run,
    Summary,
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Page::Welcome => "Welcome",
            Page::License => "License Agreement",
            Page::Choice => "Choose Action",
            Page::Key => "Access Key",
            Page::ServiceSettings => "Service Settings",
            Page::EnvVars => "Environment Variables",
            Page::Overview => "Overview",
            Page::Run => "Progress",
            Page::Summary => "Summary",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavError {
    #[error("the license must be accepted to continue")]
    LicenseNotAccepted,
    #[error("an access key is required")]
    MissingAccessKey,
    #[error("navigation is disabled while an operation is running")]
    RunActive,
    #[error("{0}")]
    Invalid(String),
    #[error("no page in that direction")]
    NoPage,
}

impl AppState {
    /// Moves forward one page, validating the current one.
    pub fn next(&mut self) -> Result<Page, NavError> {
        if self.is_running() {
            return Err(NavError::RunActive);
        }
        let install = self.plan.action() == Action::Install;

        let next = match self.page {
            Page::Welcome => Page::License,
            Page::License if !self.license_accepted => return Err(NavError::LicenseNotAccepted),
            Page::License => Page::Choice,
            Page::Choice if install => Page::Key,
            Page::Choice => Page::Overview,
            Page::Key => {
                self.plan
                    .validate_access_key()
                    .map_err(|_| NavError::MissingAccessKey)?;
                Page::ServiceSettings
            }
            Page::ServiceSettings => Page::EnvVars,
            Page::EnvVars => Page::Overview,
            Page::Overview | Page::Run | Page::Summary => return Err(NavError::NoPage),
        };
        self.page = next;
        Ok(next)
    }

    pub fn back(&mut self) -> Result<Page, NavError> {
        if self.is_running() {
            return Err(NavError::RunActive);
        }
        let install = self.plan.action() == Action::Install;

        let previous = match self.page {
            Page::License => Page::Welcome,
            Page::Choice => Page::License,
            Page::Key => Page::Choice,
            Page::ServiceSettings => Page::Key,
            Page::EnvVars => Page::ServiceSettings,
            Page::Overview if install => Page::EnvVars,
            Page::Overview => Page::Choice,
            Page::Welcome | Page::Run | Page::Summary => return Err(NavError::NoPage),
        };
        self.page = previous;
        Ok(previous)
    }

    /// Validates the plan on the overview page and enters the run page.
    pub fn begin_run(&mut self) -> Result<InstallPlan, NavError> {
        if self.is_running() {
            return Err(NavError::RunActive);
        }
        if self.page != Page::Overview {
            return Err(NavError::NoPage);
        }
        let plan = self
            .plan
            .build()
            .map_err(|e| NavError::Invalid(e.to_string()))?;
        self.page = Page::Run;
        self.run = RunStatus::Running;
        Ok(plan)
    }

    pub fn finish_run(&mut self, report: RunReport) {
        self.run = RunStatus::Finished(report);
        self.page = Page::Summary;
    }
}
