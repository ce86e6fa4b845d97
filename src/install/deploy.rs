use std::fs;
use std::path::Path;
use std::thread;

use super::archive;
use super::{Orchestrator, RunContext, Stage, DOWNLOAD_ARCHIVE_NAME, EXTRACT_DIR_NAME};
use crate::agent::service::{Nssm, ServiceControl, ServiceStatus};
use crate::agent::{
    ACCESS_KEY_VAR, AGENT_EXE_PREFIX, AGENT_EXE_SUFFIX, CONTROL_CENTER_DIR, CONTROL_CENTER_EXE,
    INSTALLED_VERSION_VALUE, INSTALLER_COPY_EXE, SHORTCUT_NAME,
};
use crate::error::{ManagerError, Result};
use crate::release::version_from_url;
use crate::system::probe::SystemProbe;
use crate::system::registry::{service_parameters_key, Registry, MACHINE_ENVIRONMENT_KEY};
use crate::system::{chocolatey, firewall, shortcut};
use crate::ui::alerts::AlertType;

const UNKNOWN_VERSION: &str = "Unknown";

pub(super) fn run(o: &Orchestrator, ctx: &mut RunContext) -> Result<()> {
    ctx.log.append("Starting installation...");
    ctx.log
        .append(&format!("Install directory: {}", o.plan.install_dir().display()));

    ctx.enter(Stage::PreparePrereqs)?;
    prepare_prereqs(o, ctx)?;

    ctx.enter(Stage::Download)?;
    let asset_token = &o.config.release.asset_token;
    let artifact = o.feed.fetch_latest_artifact(asset_token).ok_or_else(|| {
        ManagerError::Http(format!("no download URL found for {asset_token}"))
    })?;
    ctx.log.append(&format!("Downloading {}", artifact.url));
    fs::create_dir_all(&o.paths.downloads_dir)?;
    let archive_path = o.paths.downloads_dir.join(DOWNLOAD_ARCHIVE_NAME);
    let bytes = match o.feed.download(&artifact.url, &archive_path, ctx.cancel()) {
        Ok(bytes) => bytes,
        Err(e) => {
            if archive_path.exists() {
                let _ = fs::remove_file(&archive_path);
            }
            return Err(e);
        }
    };
    ctx.log.append(&format!("Downloaded {bytes} bytes"));

    ctx.enter(Stage::Extract)?;
    let scratch = o.paths.downloads_dir.join(EXTRACT_DIR_NAME);
    let entries = archive::extract_archive(&archive_path, &scratch)?;
    ctx.log
        .append(&format!("Extracted {} entries to {}", entries.len(), scratch.display()));

    ctx.enter(Stage::PlaceBinary)?;
    let found = archive::locate_binary(&scratch, AGENT_EXE_PREFIX, AGENT_EXE_SUFFIX)?;
    let agent_exe = o.plan.agent_exe();
    fs::create_dir_all(o.plan.install_dir())?;
    fs::copy(&found, &agent_exe)?;
    ctx.log.append(&format!("Copied agent to {}", agent_exe.display()));
    if let Err(e) = fs::remove_dir_all(&scratch) {
        ctx.warn(format!("Could not clean up {}: {e}", scratch.display()));
    }

    ctx.enter(Stage::RegisterService)?;
    let version = artifact
        .version
        .clone()
        .or_else(|| version_from_url(&artifact.url))
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
    register_service(o, ctx, &agent_exe, &version)?;

    ctx.enter(Stage::Configure)?;
    configure(o, ctx)?;

    ctx.enter(Stage::Start)?;
    let service = &o.config.service;
    match ServiceControl::new(o.runner.as_ref(), &service.name).start() {
        Ok(output) if output.success() => ctx.log.output(&output.combined()),
        Ok(output) => ctx.warn(format!("Service start reported: {}", output.combined())),
        Err(e) => ctx.warn(format!("Service start failed: {e}")),
    }
    thread::sleep(service.start_wait());

    ctx.enter(Stage::Verify)?;
    verify(o, ctx, &agent_exe);

    ctx.enter(Stage::Finalize)?;
    ctx.log.append("Installation completed successfully");
    Ok(())
}

fn prepare_prereqs(o: &Orchestrator, ctx: &mut RunContext) -> Result<()> {
    let runner = o.runner.as_ref();
    let service = &o.config.service;

    if chocolatey::is_installed(runner) {
        ctx.log.append("Chocolatey is already installed");
    } else {
        ctx.log.append("Installing Chocolatey...");
        let output = chocolatey::install(runner, &service.choco_bin_dir, service.prereq_wait())?;
        ctx.log.output(&output.combined());
    }

    let nssm = Nssm::new(runner, &service.nssm_path, &service.name);
    if nssm.is_present() {
        ctx.log.append("NSSM is already installed");
        return Ok(());
    }

    ctx.log.append("Installing NSSM...");
    let output = chocolatey::install_package(runner, "nssm")?;
    ctx.log.output(&output.combined());
    if !nssm.is_present() {
        return Err(ManagerError::Prerequisite(format!(
            "NSSM not found at {}",
            service.nssm_path.display()
        )));
    }
    Ok(())
}

fn register_service(
    o: &Orchestrator,
    ctx: &mut RunContext,
    agent_exe: &Path,
    version: &str,
) -> Result<()> {
    let runner = o.runner.as_ref();
    let service = &o.config.service;

    let registry = Registry::new(runner);
    match registry.set_string(
        &service_parameters_key(&service.name),
        INSTALLED_VERSION_VALUE,
        version,
    ) {
        Ok(()) => ctx.log.append(&format!("Recorded installed version {version}")),
        Err(e) => ctx.warn(format!("Could not record installed version: {e}")),
    }

    let output = Nssm::new(runner, &service.nssm_path, &service.name).install(agent_exe)?;
    if output.success() {
        ctx.log.output(&output.combined());
    } else {
        ctx.warn(format!("nssm install reported: {}", output.combined()));
    }
    Ok(())
}

fn configure(o: &Orchestrator, ctx: &mut RunContext) -> Result<()> {
    let runner = o.runner.as_ref();
    let service = &o.config.service;
    let nssm = Nssm::new(runner, &service.nssm_path, &service.name);

    let start_type = o.plan.start_type();
    match nssm.set_start_type(start_type) {
        Ok(()) => ctx.log.append(&format!("Start type set to {start_type}")),
        Err(e) => ctx.warn(format!("Could not set start type: {e}")),
    }

    let key = o
        .plan
        .access_key()
        .ok_or_else(|| ManagerError::Plan("access key missing".to_string()))?;
    nssm.set("AppEnvironmentExtra", &format!("{ACCESS_KEY_VAR}={key}"))?;
    ctx.log.append("Access key configured");

    let registry = Registry::new(runner);
    for (name, value) in o.plan.extra_env() {
        match registry.set_string(MACHINE_ENVIRONMENT_KEY, name, value) {
            Ok(()) => ctx.log.append(&format!("Environment variable {name} set")),
            Err(e) => ctx.warn(format!("Could not set environment variable {name}: {e}")),
        }
    }

    install_control_center(o, ctx);
    copy_installer(o, ctx);

    match firewall::ensure_rule(runner, &service.firewall_rule, service.agent_port) {
        Ok(true) => ctx.log.append(&format!(
            "Firewall rule '{}' created for port {}",
            service.firewall_rule, service.agent_port
        )),
        Ok(false) => ctx
            .log
            .append(&format!("Firewall rule '{}' already exists", service.firewall_rule)),
        Err(e) => ctx.warn(format!("Could not configure firewall: {e}")),
    }

    Ok(())
}

fn install_control_center(o: &Orchestrator, ctx: &mut RunContext) {
    let Some(source) = o.paths.control_panel_source.as_ref().filter(|p| p.is_file()) else {
        ctx.warn("Control Center executable not found, skipping");
        return;
    };

    let target_dir = o.plan.install_dir().join(CONTROL_CENTER_DIR);
    let target = target_dir.join(CONTROL_CENTER_EXE);
    let copied = fs::create_dir_all(&target_dir).and_then(|_| fs::copy(source, &target));
    if let Err(e) = copied {
        ctx.warn(format!("Could not copy Control Center: {e}"));
        return;
    }
    ctx.log
        .append(&format!("Control Center copied to {}", target.display()));

    let Some(desktop) = &o.paths.desktop_dir else {
        ctx.warn("Desktop folder not found, no shortcut created");
        return;
    };
    let link = desktop.join(SHORTCUT_NAME);
    match shortcut::create_shortcut(o.runner.as_ref(), &link, &target, &o.paths.log_dir) {
        Ok(()) => ctx.log.append("Desktop shortcut created"),
        Err(e) => ctx.warn(format!("Could not create desktop shortcut: {e}")),
    }
}

fn copy_installer(o: &Orchestrator, ctx: &mut RunContext) {
    let Some(installer) = o.paths.installer_exe.as_ref().filter(|p| p.is_file()) else {
        ctx.warn("Installer executable not found, skipping copy");
        return;
    };
    let target = o.plan.install_dir().join(INSTALLER_COPY_EXE);
    if installer == &target {
        ctx.log.append("Installer is already running from the install directory");
        return;
    }
    match fs::copy(installer, &target) {
        Ok(_) => ctx
            .log
            .append(&format!("Installer copied to {}", target.display())),
        Err(e) => ctx.warn(format!("Could not copy installer: {e}")),
    }
}

fn verify(o: &Orchestrator, ctx: &mut RunContext, agent_exe: &Path) {
    let name = &o.config.service.name;
    let probe = SystemProbe::new(o.runner.clone());

    let record = probe.probe_service(name);
    let version = probe.probe_installed_version(name, Some(agent_exe));
    ctx.log.append(&format!(
        "Service status: {}, installed version: {}",
        record.status,
        version.as_deref().unwrap_or(UNKNOWN_VERSION)
    ));

    if record.status != ServiceStatus::Running {
        let message = format!(
            "Service {name} is {} after installation. Check the install log.",
            record.status
        );
        ctx.warn(message.clone());
        o.notifier.notify(AlertType::Error, "Service error", &message);
    }

    ctx.service = Some(record);
    ctx.installed_version = version;
}
