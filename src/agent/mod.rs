pub mod config;
pub mod service;

/// Name of the agent executable inside the install directory.
pub const AGENT_EXE: &str = "beszel-agent.exe";

/// Folder name appended to Program Files for the default install directory.
pub const AGENT_DIR_NAME: &str = "beszel-agent";

/// Prefix and suffix identifying the agent binary inside a release archive.
pub const AGENT_EXE_PREFIX: &str = "beszel-agent";
pub const AGENT_EXE_SUFFIX: &str = ".exe";

/// Environment variable carrying the access key into the service process.
pub const ACCESS_KEY_VAR: &str = "KEY";

/// Registry value names under the service parameters key.
pub const APPLICATION_VALUE: &str = "Application";
pub const INSTALLED_VERSION_VALUE: &str = "InstalledVersion";

/// Control panel copy placed in the install directory.
pub const CONTROL_CENTER_DIR: &str = "control-center";
pub const CONTROL_CENTER_EXE: &str = "BeszelAgentControlCenter.exe";

/// Copy of the installer kept for later uninstall/update runs.
pub const INSTALLER_COPY_EXE: &str = "BeszelAgentSetup.exe";

pub const SHORTCUT_NAME: &str = "Beszel Control Center.lnk";
pub const INSTALL_LOG_NAME: &str = "install.log";

/// File name of the control panel as built, before it is renamed on copy.
pub const CONTROL_PANEL_BUILD_EXE: &str = "beszel-agent-control.exe";
