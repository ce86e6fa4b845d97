//! Installed vs. latest version reconciliation.
//!
//! Versions are compared as plain strings after dropping one leading `v`.
//! There is no semantic-version ordering: `1.2` and `1.2.0` are different
//! versions, and any difference counts as an available update.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionVerdict {
    UpToDate,
    UpdateAvailable,
    Unknown,
}

impl fmt::Display for VersionVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VersionVerdict::UpToDate => "Agent is up to date",
            VersionVerdict::UpdateAvailable => "Update available",
            VersionVerdict::Unknown => "Version status unknown",
        })
    }
}

/// Installed and latest versions from one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub installed: Option<String>,
    pub latest: Option<String>,
}

impl VersionInfo {
    pub fn verdict(&self) -> VersionVerdict {
        reconcile(self.installed.as_deref(), self.latest.as_deref())
    }
}

/// Drops a single leading lowercase `v`.
pub fn normalize(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

/// Compares the installed agent version with the latest release.
///
/// # Arguments
///
/// * `installed` - Version reported by the agent binary, if any
/// * `latest` - Latest release tag, if the lookup succeeded
///
/// # Returns
///
/// * `VersionVerdict::UpToDate` - Both are known and equal ignoring a leading `v`
/// * `VersionVerdict::UpdateAvailable` - Both are known and differ
/// * `VersionVerdict::Unknown` - Either side is missing
pub fn reconcile(installed: Option<&str>, latest: Option<&str>) -> VersionVerdict {
    match (installed, latest) {
        (Some(installed), Some(latest)) if normalize(installed) == normalize(latest) => {
            VersionVerdict::UpToDate
        }
        (Some(_), Some(_)) => VersionVerdict::UpdateAvailable,
        _ => VersionVerdict::Unknown,
    }
}
