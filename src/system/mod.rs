//! Host integration: process execution, registry, service probing and the
//! helper tools the installer drives.

pub mod chocolatey;
pub mod firewall;
pub mod probe;
pub mod process;
pub mod registry;
pub mod shortcut;

/// Quotes `value` as a PowerShell single-quoted string literal.
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
