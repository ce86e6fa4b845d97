pub mod logger;

use log::warn;

use crate::system::process::CommandRunner;

/// Checks if the current process is running with administrator privileges.
///
/// `net session` only succeeds for elevated processes. Any failure to run
/// it counts as not elevated.
pub fn is_admin(runner: &dyn CommandRunner) -> bool {
    match runner.run("net", &["session"]) {
        Ok(output) => output.success(),
        Err(e) => {
            warn!("Failed to check admin privileges: {}", e);
            false
        }
    }
}
