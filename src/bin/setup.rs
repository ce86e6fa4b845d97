use std::io;
use std::process;
use std::sync::Arc;

use crossbeam::channel::unbounded;
use log::{error, info, warn};

use beszel_agent_manager::agent::config;
use beszel_agent_manager::install::{HostPaths, Orchestrator};
use beszel_agent_manager::release::GithubReleases;
use beszel_agent_manager::system::process::SystemRunner;
use beszel_agent_manager::ui::alerts::{AlertType, DesktopNotifier, Notifier};
use beszel_agent_manager::ui::console::Console;
use beszel_agent_manager::ui::setup::SetupWizard;
use beszel_agent_manager::ui::AppState;
use beszel_agent_manager::utils;

fn main() {
    if let Err(e) = utils::logger::init() {
        eprintln!("Failed to initialize logger: {}", e);
        process::exit(1);
    }

    let config = config::load_or_default();
    utils::logger::apply_level(&config.general.log_level);

    info!("Beszel Agent Setup starting up...");

    let runner = Arc::new(SystemRunner);
    let notifier: Arc<dyn Notifier> = Arc::new(DesktopNotifier);

    if !utils::is_admin(runner.as_ref()) {
        error!("This application requires administrator privileges.");
        notifier.notify(
            AlertType::Error,
            "Administrator rights required",
            "Please restart the setup as administrator.",
        );
        process::exit(1);
    }

    let stdin = io::stdin();
    let mut wizard = SetupWizard::new(Console::new(stdin.lock(), io::stdout()));
    let mut state = AppState::new(config.service.install_dir.clone());

    let plan = match wizard.collect(&mut state) {
        Ok(Some(plan)) => plan,
        Ok(None) => {
            info!("Setup cancelled");
            return;
        }
        Err(e) => {
            error!("Setup aborted: {}", e);
            process::exit(1);
        }
    };

    let (tx, rx) = unbounded();
    let feed = Arc::new(GithubReleases::from_config(&config.release));
    let orchestrator = Orchestrator::new(
        plan,
        config,
        HostPaths::detect(),
        runner,
        feed,
        notifier,
    )
    .with_events(tx);

    let handle = match orchestrator.spawn() {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start worker: {}", e);
            process::exit(1);
        }
    };

    let interrupt = match handle.cancel_on(tokio::signal::ctrl_c()) {
        Ok(guard) => {
            println!("Press Ctrl-C to cancel.");
            Some(guard)
        }
        Err(e) => {
            warn!("Cancellation is unavailable: {}", e);
            None
        }
    };

    let followed = wizard.follow(&mut state, &rx);
    let report = match handle.join() {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    drop(interrupt);
    if let Err(e) = followed {
        error!("Lost track of the run: {}", e);
    }

    info!("Setup finished");
    if !report.succeeded() {
        process::exit(1);
    }
}
