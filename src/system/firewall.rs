//! Inbound firewall rule for the agent port.

use log::info;

use crate::error::{ManagerError, Result};
use crate::system::process::CommandRunner;
use crate::system::ps_quote;

pub fn rule_exists(runner: &dyn CommandRunner, display_name: &str) -> Result<bool> {
    let script = format!(
        "Get-NetFirewallRule -DisplayName {} -ErrorAction SilentlyContinue",
        ps_quote(display_name)
    );
    let output = runner.run("powershell", &["-NoProfile", "-Command", &script])?;
    Ok(output.success() && !output.stdout.trim().is_empty())
}

pub fn create_rule(runner: &dyn CommandRunner, display_name: &str, port: u16) -> Result<()> {
    let script = format!(
        "New-NetFirewallRule -DisplayName {} -Direction Inbound -LocalPort {} -Protocol TCP -Action Allow",
        ps_quote(display_name),
        port
    );
    let output = runner.run("powershell", &["-NoProfile", "-Command", &script])?;
    if output.success() {
        Ok(())
    } else {
        Err(ManagerError::command("New-NetFirewallRule", output.combined()))
    }
}

/// Creates the rule only when no rule with that display name exists.
/// Returns whether a rule was created.
pub fn ensure_rule(runner: &dyn CommandRunner, display_name: &str, port: u16) -> Result<bool> {
    if rule_exists(runner, display_name)? {
        info!("Firewall rule '{}' already exists", display_name);
        return Ok(false);
    }
    create_rule(runner, display_name, port)?;
    info!("Firewall rule '{}' created for TCP {}", display_name, port);
    Ok(true)
}
