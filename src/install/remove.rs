use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use super::{Orchestrator, RunContext, Stage};
use crate::agent::service::Nssm;
use crate::agent::SHORTCUT_NAME;
use crate::error::Result;
use crate::system::probe::SystemProbe;

const REMOVE_RETRY_DELAY: Duration = Duration::from_secs(1);

pub(super) fn run(o: &Orchestrator, ctx: &mut RunContext) -> Result<()> {
    let service = &o.config.service;
    let nssm = Nssm::new(o.runner.as_ref(), &service.nssm_path, &service.name);
    ctx.log.append("Starting uninstallation...");

    // Resolved up front: `nssm remove` deletes the Parameters key.
    let install_dir = SystemProbe::new(o.runner.clone())
        .probe_install_path(&service.name)
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    match &install_dir {
        Some(dir) => ctx
            .log
            .append(&format!("Install directory: {}", dir.display())),
        None => ctx
            .log
            .append("Service registry path not found, no files will be removed"),
    }

    ctx.enter(Stage::StopService)?;
    match nssm.stop() {
        Ok(output) => ctx.log.output(&output.combined()),
        Err(e) => ctx.warn(format!("Could not stop service: {e}")),
    }

    ctx.enter(Stage::RemoveServiceDef)?;
    match nssm.remove() {
        Ok(output) if output.success() => ctx.log.output(&output.combined()),
        Ok(output) => ctx.warn(format!("nssm remove reported: {}", output.combined())),
        Err(e) => ctx.warn(format!("Could not remove service: {e}")),
    }

    ctx.enter(Stage::RemoveFiles)?;
    if let Some(dir) = install_dir {
        remove_install_dir(ctx, &dir);
    }
    if let Some(desktop) = &o.paths.desktop_dir {
        remove_shortcut(ctx, &desktop.join(SHORTCUT_NAME));
    }

    ctx.enter(Stage::Finalize)?;
    ctx.log.append("Uninstallation completed");
    Ok(())
}

fn remove_install_dir(ctx: &mut RunContext, dir: &Path) {
    if !dir.exists() {
        ctx.log
            .append(&format!("{} not found, nothing to delete", dir.display()));
        return;
    }

    if let Err(first) = fs::remove_dir_all(dir) {
        ctx.log.append(&format!(
            "First removal attempt failed ({first}), retrying..."
        ));
        thread::sleep(REMOVE_RETRY_DELAY);
        if let Err(e) = fs::remove_dir_all(dir) {
            ctx.warn(format!(
                "Some files in {} could not be removed: {e}",
                dir.display()
            ));
            return;
        }
    }
    ctx.log.append(&format!("Removed {}", dir.display()));
}

fn remove_shortcut(ctx: &mut RunContext, link: &Path) {
    if !link.exists() {
        return;
    }
    match fs::remove_file(link) {
        Ok(()) => ctx.log.append("Desktop shortcut removed"),
        Err(e) => ctx.warn(format!("Could not remove desktop shortcut: {e}")),
    }
}
