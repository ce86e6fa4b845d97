//! Desktop shortcuts, created through a throwaway PowerShell script.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{ManagerError, Result};
use crate::system::process::CommandRunner;
use crate::system::ps_quote;

fn shortcut_script(shortcut: &Path, target: &Path, working_dir: &Path) -> String {
    format!(
        "$WshShell = New-Object -ComObject WScript.Shell\r\n\
         $Shortcut = $WshShell.CreateShortcut({})\r\n\
         $Shortcut.TargetPath = {}\r\n\
         $Shortcut.WorkingDirectory = {}\r\n\
         $Shortcut.Save()\r\n",
        ps_quote(&shortcut.to_string_lossy()),
        ps_quote(&target.to_string_lossy()),
        ps_quote(&working_dir.to_string_lossy()),
    )
}

fn script_path(scratch_dir: &Path) -> PathBuf {
    scratch_dir.join(format!("beszel-shortcut-{}.ps1", std::process::id()))
}

/// Writes `shortcut` (a `.lnk` path) pointing at `target`. The helper script
/// is placed in `scratch_dir` and removed afterwards.
pub fn create_shortcut(
    runner: &dyn CommandRunner,
    shortcut: &Path,
    target: &Path,
    scratch_dir: &Path,
) -> Result<()> {
    let working_dir = target.parent().unwrap_or(target);
    let script = script_path(scratch_dir);
    fs::write(&script, shortcut_script(shortcut, target, working_dir))?;

    let script_arg = script.to_string_lossy().into_owned();
    let result = runner.run(
        "powershell",
        &["-NoProfile", "-ExecutionPolicy", "Bypass", "-File", &script_arg],
    );

    if let Err(e) = fs::remove_file(&script) {
        debug!("Could not remove {}: {}", script.display(), e);
    }

    let output = result?;
    if !output.success() {
        return Err(ManagerError::command("powershell", output.combined()));
    }
    info!("Shortcut created at {}", shortcut.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    #[test]
    fn script_targets_executable_and_its_directory() {
        let script = shortcut_script(
            Path::new(r"C:\Users\me\Desktop\Beszel.lnk"),
            Path::new(r"C:\Program Files\beszel-agent\control-center\panel.exe"),
            Path::new(r"C:\Program Files\beszel-agent\control-center"),
        );
        assert!(script.contains("WScript.Shell"));
        assert!(script.contains(r"CreateShortcut('C:\Users\me\Desktop\Beszel.lnk')"));
        assert!(script.contains(r"WorkingDirectory = 'C:\Program Files\beszel-agent\control-center'"));
    }

    #[test]
    fn helper_script_is_removed_after_run() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::new();

        create_shortcut(
            &host,
            &dir.path().join("panel.lnk"),
            &dir.path().join("panel.exe"),
            dir.path(),
        )
        .unwrap();

        assert!(!script_path(dir.path()).exists());
        assert!(host.calls()[0].contains("-File"));
    }
}
