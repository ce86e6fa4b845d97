//! Running external commands.
//!
//! Every OS tool the manager drives (`sc`, `reg`, `nssm`, `choco`,
//! `powershell`, the agent binary itself) goes through [`CommandRunner`], so
//! the workflow can be exercised against a scripted host in tests.

use std::ffi::OsStr;
use std::process::{Command, Stdio};

use log::debug;

use crate::error::{ManagerError, Result};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr, the way the operation log records it.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Executes a program with arguments and captures its output.
///
/// Implementations must not fail for a non-zero exit code; only a failure
/// to launch the program is an error.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Runs real processes on the local machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn execute(&self, mut command: Command, program: &str) -> Result<CommandOutput> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        hide_console(&mut command);

        let output = command
            .output()
            .map_err(|e| ManagerError::command(program, e.to_string()))?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("`{}` exited with {:?}", program, result.code);
        Ok(result)
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut command = Command::new(program);
        command.args(args.iter().map(OsStr::new));
        self.execute(command, program)
    }
}

/// Keeps helper tools from flashing a console window over the GUI.
#[cfg(windows)]
fn hide_console(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    use windows::Win32::System::Threading::CREATE_NO_WINDOW;

    command.creation_flags(CREATE_NO_WINDOW.0);
}

#[cfg(not(windows))]
fn hide_console(_command: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_joins_stdout_and_stderr() {
        let output = CommandOutput {
            code: Some(1),
            stdout: "first\n".to_string(),
            stderr: "second\n".to_string(),
        };
        assert_eq!(output.combined(), "first\nsecond");
        assert!(!output.success());
    }

    #[test]
    fn combined_skips_empty_streams() {
        let output = CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: "only error".to_string(),
        };
        assert_eq!(output.combined(), "only error");
        assert!(output.success());
    }

    #[test]
    fn missing_program_is_an_error() {
        let result = SystemRunner.run("definitely-not-a-real-program-4711", &[]);
        assert!(matches!(result, Err(ManagerError::Command { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn runs_real_process_and_captures_output() {
        let output = SystemRunner.run("sh", &["-c", "echo hello; exit 3"]).unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.code, Some(3));
    }
}
