//! Chocolatey bootstrap and package installs.

use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::error::{ManagerError, Result};
use crate::system::process::{CommandOutput, CommandRunner};

const INSTALL_SCRIPT: &str = "Set-ExecutionPolicy Bypass -Scope Process -Force; \
[System.Net.ServicePointManager]::SecurityProtocol = \
[System.Net.ServicePointManager]::SecurityProtocol -bor 3072; \
iex ((New-Object System.Net.WebClient).DownloadString('https://community.chocolatey.org/install.ps1'))";

pub fn is_installed(runner: &dyn CommandRunner) -> bool {
    match runner.run("choco", &["-v"]) {
        Ok(output) => output.success(),
        Err(e) => {
            debug!("choco not available: {}", e);
            false
        }
    }
}

/// Runs the official bootstrap script, waits `settle`, then puts
/// `bin_dir` on this process's `PATH` so later `choco` calls resolve.
pub fn install(runner: &dyn CommandRunner, bin_dir: &Path, settle: Duration) -> Result<CommandOutput> {
    info!("Installing Chocolatey");
    let output = runner.run(
        "powershell",
        &["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command", INSTALL_SCRIPT],
    )?;
    if !output.success() {
        return Err(ManagerError::Prerequisite(format!(
            "Chocolatey installation failed: {}",
            output.combined()
        )));
    }

    thread::sleep(settle);
    extend_path(bin_dir);

    if !is_installed(runner) {
        return Err(ManagerError::Prerequisite(
            "Chocolatey was installed but `choco` is still unavailable".to_string(),
        ));
    }
    Ok(output)
}

/// `choco install <package> -y`.
pub fn install_package(runner: &dyn CommandRunner, package: &str) -> Result<CommandOutput> {
    info!("Installing {} through Chocolatey", package);
    let output = runner
        .run("choco", &["install", package, "-y"])
        .map_err(|e| ManagerError::Prerequisite(format!("cannot run choco: {e}")))?;
    if !output.success() {
        return Err(ManagerError::Prerequisite(format!(
            "choco install {package} failed: {}",
            output.combined()
        )));
    }
    Ok(output)
}

fn extend_path(dir: &Path) {
    let current = std::env::var_os("PATH").unwrap_or_default();
    if std::env::split_paths(&current).any(|entry| entry == dir) {
        return;
    }
    let mut entries: Vec<_> = std::env::split_paths(&current).collect();
    entries.push(dir.to_path_buf());
    match std::env::join_paths(entries) {
        Ok(joined) => std::env::set_var("PATH", joined),
        Err(e) => {
            debug!("Cannot extend PATH with {}: {}", dir.display(), e);
            let mut fallback = current;
            fallback.push(";");
            fallback.push(dir);
            std::env::set_var("PATH", fallback);
        }
    }
}
