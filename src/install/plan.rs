//! Install plan collected by the wizard.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::agent::service::StartType;
use crate::agent::{AGENT_EXE, INSTALL_LOG_NAME};
use crate::error::{ManagerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Install,
    Uninstall,
    Update,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Install, Action::Uninstall, Action::Update];

    /// Title of the notification shown when a run of this action fails.
    pub fn error_title(self) -> &'static str {
        match self {
            Action::Install => "Installation error",
            Action::Uninstall => "Uninstall error",
            Action::Update => "Update error",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Install => "Install Beszel Agent",
            Action::Uninstall => "Uninstall Beszel Agent",
            Action::Update => "Update existing Beszel Agent",
        })
    }
}

/// Validated, immutable plan handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    action: Action,
    install_dir: PathBuf,
    start_type: StartType,
    access_key: Option<String>,
    extra_env: Vec<(String, String)>,
}

impl InstallPlan {
    pub fn action(&self) -> Action {
        self.action
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn start_type(&self) -> StartType {
        self.start_type
    }

    pub fn access_key(&self) -> Option<&str> {
        self.access_key.as_deref()
    }

    pub fn extra_env(&self) -> &[(String, String)] {
        &self.extra_env
    }

    pub fn agent_exe(&self) -> PathBuf {
        self.install_dir.join(AGENT_EXE)
    }

    pub fn install_log(&self) -> PathBuf {
        self.install_dir.join(INSTALL_LOG_NAME)
    }
}

/// Mutable plan state, filled in page by page.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    action: Action,
    install_dir: PathBuf,
    start_type: StartType,
    access_key: String,
    extra_env: Vec<(String, String)>,
}

impl PlanBuilder {
    pub fn new(default_install_dir: impl Into<PathBuf>) -> Self {
        PlanBuilder {
            action: Action::Install,
            install_dir: default_install_dir.into(),
            start_type: StartType::Automatic,
            access_key: String::new(),
            extra_env: Vec::new(),
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn set_action(&mut self, action: Action) -> &mut Self {
        self.action = action;
        self
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn set_install_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.install_dir = dir.into();
        self
    }

    pub fn start_type(&self) -> StartType {
        self.start_type
    }

    pub fn set_start_type(&mut self, start_type: StartType) -> &mut Self {
        self.start_type = start_type;
        self
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn set_access_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.access_key = key.into();
        self
    }

    pub fn extra_env(&self) -> &[(String, String)] {
        &self.extra_env
    }

    /// Adds a machine-wide variable. Blank names or values are ignored and
    /// `false` is returned.
    pub fn add_env_var(&mut self, name: &str, value: &str) -> bool {
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() {
            return false;
        }
        self.extra_env.push((name.to_string(), value.to_string()));
        true
    }

    pub fn validate_access_key(&self) -> Result<()> {
        if self.action == Action::Install && self.access_key.trim().is_empty() {
            return Err(ManagerError::Plan(
                "an access key is required to install the agent".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build(&self) -> Result<InstallPlan> {
        self.validate_access_key()?;
        if self.install_dir.as_os_str().is_empty() {
            return Err(ManagerError::Plan("install directory is empty".to_string()));
        }
        if self.action == Action::Install && self.start_type == StartType::Unknown {
            return Err(ManagerError::Plan("a service start type must be chosen".to_string()));
        }

        let key = self.access_key.trim();
        Ok(InstallPlan {
            action: self.action,
            install_dir: self.install_dir.clone(),
            start_type: self.start_type,
            access_key: (!key.is_empty()).then(|| key.to_string()),
            extra_env: self.extra_env.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_requires_access_key() {
        let builder = PlanBuilder::new("/opt/beszel-agent");
        assert!(matches!(builder.build(), Err(ManagerError::Plan(_))));

        let mut builder = builder;
        builder.set_access_key("   ");
        assert!(builder.validate_access_key().is_err());

        builder.set_access_key("abc123");
        let plan = builder.build().unwrap();
        assert_eq!(plan.access_key(), Some("abc123"));
        assert_eq!(plan.action(), Action::Install);
    }

    #[test]
    fn uninstall_and_update_need_no_key() {
        let mut builder = PlanBuilder::new("/opt/beszel-agent");
        builder.set_action(Action::Uninstall);
        assert!(builder.build().unwrap().access_key().is_none());

        builder.set_action(Action::Update);
        assert!(builder.build().is_ok());
    }

    #[test]
    fn blank_env_entries_are_ignored() {
        let mut builder = PlanBuilder::new("/opt/beszel-agent");
        assert!(!builder.add_env_var("", "value"));
        assert!(!builder.add_env_var("NAME", "  "));
        assert!(builder.add_env_var(" LISTEN ", " 45876 "));
        assert!(builder.add_env_var("LOG_LEVEL", "debug"));

        assert_eq!(
            builder.extra_env(),
            &[
                ("LISTEN".to_string(), "45876".to_string()),
                ("LOG_LEVEL".to_string(), "debug".to_string()),
            ]
        );
    }

    #[test]
    fn plan_paths_derive_from_install_dir() {
        let mut builder = PlanBuilder::new("/opt/beszel-agent");
        builder.set_access_key("k");
        let plan = builder.build().unwrap();
        assert_eq!(plan.agent_exe(), Path::new("/opt/beszel-agent/beszel-agent.exe"));
        assert_eq!(plan.install_log(), Path::new("/opt/beszel-agent/install.log"));
    }

    #[test]
    fn empty_install_dir_is_rejected() {
        let mut builder = PlanBuilder::new("");
        builder.set_access_key("k");
        assert!(builder.build().is_err());
    }
}
