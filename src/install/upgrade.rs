use std::path::Path;

use super::{Orchestrator, RunContext, Stage};
use crate::agent::{AGENT_EXE, INSTALLED_VERSION_VALUE};
use crate::error::{ManagerError, Result};
use crate::system::probe::SystemProbe;
use crate::system::ps_quote;
use crate::system::registry::{service_parameters_key, Registry};

pub(super) fn run(o: &Orchestrator, ctx: &mut RunContext) -> Result<()> {
    let name = &o.config.service.name;
    let probe = SystemProbe::new(o.runner.clone());
    ctx.log.append("Starting update...");

    ctx.enter(Stage::ResolveInstallDir)?;
    let install_dir = probe
        .probe_install_path(name)
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| o.plan.install_dir().to_path_buf());
    let agent_exe = install_dir.join(AGENT_EXE);
    if !agent_exe.is_file() {
        return Err(ManagerError::NotFound(agent_exe));
    }
    ctx.log
        .append(&format!("Updating agent in {}", install_dir.display()));

    ctx.enter(Stage::RunUpdater)?;
    let script = format!(
        "& {{ Set-Location -Path {}; ./{} update }}",
        ps_quote(&install_dir.to_string_lossy()),
        AGENT_EXE
    );
    let output = o
        .runner
        .run("powershell", &["-NoProfile", "-Command", &script])?;
    ctx.log.output(&output.combined());
    if !output.success() {
        return Err(ManagerError::command(
            AGENT_EXE,
            format!("update exited with code {:?}", output.code),
        ));
    }

    ctx.enter(Stage::Finalize)?;
    match probe.probe_binary_version(&agent_exe) {
        Some(version) => {
            let registry = Registry::new(o.runner.as_ref());
            match registry.set_string(&service_parameters_key(name), INSTALLED_VERSION_VALUE, &version)
            {
                Ok(()) => ctx.log.append(&format!("Recorded installed version {version}")),
                Err(e) => ctx.warn(format!("Could not record installed version: {e}")),
            }
            ctx.installed_version = Some(version);
        }
        None => ctx.log.append("Agent did not report its version after update"),
    }
    ctx.log.append("Update completed");
    Ok(())
}
