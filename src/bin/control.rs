use std::io::{self, BufRead};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{select, unbounded};
use log::{error, info, warn};

use beszel_agent_manager::agent::config;
use beszel_agent_manager::install::HostPaths;
use beszel_agent_manager::release::{GithubReleases, ReleaseFeed};
use beszel_agent_manager::system::probe::SystemProbe;
use beszel_agent_manager::system::process::SystemRunner;
use beszel_agent_manager::ui::alerts::{AlertType, DesktopNotifier, Notifier};
use beszel_agent_manager::ui::control::{render_snapshot, ControlCommand, ControlPanel, HELP};
use beszel_agent_manager::ui::monitor::{AgentStatus, StatusMonitor, StatusSource};
use beszel_agent_manager::utils;

fn main() {
    if let Err(e) = utils::logger::init() {
        eprintln!("Failed to initialize logger: {}", e);
        process::exit(1);
    }

    let config = config::load_or_default();
    utils::logger::apply_level(&config.general.log_level);

    info!("Beszel Agent Control Center starting up...");

    let runner = Arc::new(SystemRunner);
    let notifier: Arc<dyn Notifier> = Arc::new(DesktopNotifier);

    if !utils::is_admin(runner.as_ref()) {
        error!("This application requires administrator privileges.");
        notifier.notify(
            AlertType::Error,
            "Administrator rights required",
            "Please restart the Control Center as administrator.",
        );
        process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            process::exit(1);
        }
    };

    let feed: Arc<dyn ReleaseFeed> = Arc::new(GithubReleases::from_config(&config.release));
    let source: Arc<dyn StatusSource> = Arc::new(AgentStatus::new(
        SystemProbe::new(runner.clone()),
        feed.clone(),
        config.service.name.clone(),
    ));
    let interval = Duration::from_secs(config.general.refresh_interval_secs.max(1));
    let (monitor, snapshots) = StatusMonitor::spawn(runtime.handle(), source, interval);

    let panel = ControlPanel::new(config, runner, feed, notifier, HostPaths::detect());

    let (command_tx, commands) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if command_tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("{HELP}");
    loop {
        select! {
            recv(snapshots) -> snapshot => match snapshot {
                Ok(snapshot) => println!("{}", render_snapshot(&snapshot)),
                Err(_) => {
                    warn!("Status monitor stopped unexpectedly");
                    break;
                }
            },
            recv(commands) -> line => {
                let Ok(line) = line else { break };
                let command = match line.parse::<ControlCommand>() {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{e}. {HELP}");
                        continue;
                    }
                };
                match command {
                    ControlCommand::Quit => break,
                    ControlCommand::Refresh => {
                        monitor.refresh_now();
                        println!("Refreshing...");
                    }
                    ControlCommand::Help => println!("{HELP}"),
                    other => match panel.execute(other) {
                        Ok(text) => println!("{text}"),
                        Err(e) => println!("Error: {e}"),
                    },
                }
            }
        }
    }

    runtime.block_on(monitor.shutdown());
    info!("Control Center shut down");
}
