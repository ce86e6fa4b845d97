//! Periodic status refresh for the control panel.
//!
//! [`StatusMonitor`] runs on a tokio runtime and asks a [`StatusSource`]
//! for a fresh [`StatusSnapshot`] every interval. A refresh shells out to
//! `sc` and `reg` and may hit the network, so it runs on the blocking pool
//! and is awaited before the next tick is taken: refreshes never overlap.
//! Manual refreshes go through the same loop, so they queue behind a
//! running one instead of racing it.
//! Snapshots are published on a one-slot crossbeam channel; when the UI
//! has not consumed the previous snapshot a timed tick is skipped, while a
//! manual refresh replaces the stale snapshot.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::agent::service::ServiceRecord;
use crate::release::ReleaseFeed;
use crate::system::probe::SystemProbe;
use crate::version::{VersionInfo, VersionVerdict};

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub service: ServiceRecord,
    pub version: VersionInfo,
    pub taken_at: DateTime<Local>,
}

impl StatusSnapshot {
    pub fn verdict(&self) -> VersionVerdict {
        self.version.verdict()
    }

    pub fn installed_label(&self) -> &str {
        self.version.installed.as_deref().unwrap_or("Unknown")
    }

    /// A feed failure reads differently from an unknown local version.
    pub fn latest_label(&self) -> &str {
        self.version.latest.as_deref().unwrap_or("Failed to check")
    }
}

pub trait StatusSource: Send + Sync + 'static {
    fn refresh(&self) -> StatusSnapshot;
}

/// Successful latest-version lookups are reused for this long.
const LATEST_TTL: Duration = Duration::from_secs(300);

/// Live status of the installed agent.
///
/// Service state and the installed version are probed on every refresh.
/// The latest release is the exception: a successful lookup is cached for
/// five minutes so the 5 s refresh stays within GitHub's unauthenticated
/// rate limit. A failed lookup is not cached and is retried next refresh.
pub struct AgentStatus {
    probe: SystemProbe,
    feed: Arc<dyn ReleaseFeed>,
    service_name: String,
    latest: Mutex<Option<(Instant, String)>>,
}

impl AgentStatus {
    pub fn new(probe: SystemProbe, feed: Arc<dyn ReleaseFeed>, service_name: impl Into<String>) -> Self {
        AgentStatus {
            probe,
            feed,
            service_name: service_name.into(),
            latest: Mutex::new(None),
        }
    }

    fn latest_version(&self) -> Option<String> {
        if let Ok(cached) = self.latest.lock() {
            if let Some((fetched_at, version)) = cached.as_ref() {
                if fetched_at.elapsed() < LATEST_TTL {
                    return Some(version.clone());
                }
            }
        }

        let latest = self.feed.fetch_latest_version();
        if let (Some(version), Ok(mut cached)) = (&latest, self.latest.lock()) {
            *cached = Some((Instant::now(), version.clone()));
        }
        latest
    }
}

impl StatusSource for AgentStatus {
    fn refresh(&self) -> StatusSnapshot {
        let service = self.probe.probe_service(&self.service_name);
        let installed = self
            .probe
            .probe_installed_version(&self.service_name, service.install_path.as_deref());
        let latest = self.latest_version();

        StatusSnapshot {
            service,
            version: VersionInfo { installed, latest },
            taken_at: Local::now(),
        }
    }
}

pub struct StatusMonitor {
    cancel: CancellationToken,
    trigger: Arc<Notify>,
    task: JoinHandle<()>,
}

impl StatusMonitor {
    /// Starts refreshing on `runtime`. The first refresh happens
    /// immediately.
    pub fn spawn(
        runtime: &Handle,
        source: Arc<dyn StatusSource>,
        interval: Duration,
    ) -> (Self, Receiver<StatusSnapshot>) {
        let (tx, rx) = bounded(1);
        let cancel = CancellationToken::new();
        let trigger = Arc::new(Notify::new());
        let channel = Channel {
            tx,
            stale: rx.clone(),
        };
        let task = runtime.spawn(run(source, interval, channel, trigger.clone(), cancel.clone()));
        (
            StatusMonitor {
                cancel,
                trigger,
                task,
            },
            rx,
        )
    }

    /// Requests an out-of-schedule refresh. It starts once any running
    /// refresh has finished; requests made meanwhile collapse into one.
    pub fn refresh_now(&self) {
        self.trigger.notify_one();
    }

    /// Stops the ticker and waits for an in-flight refresh to be abandoned.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Status monitor task ended abnormally: {}", e);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Tick,
    Manual,
}

struct Channel {
    tx: Sender<StatusSnapshot>,
    /// Used to drop an unread snapshot that a manual refresh supersedes.
    stale: Receiver<StatusSnapshot>,
}

impl Channel {
    fn publish(&self, snapshot: StatusSnapshot) {
        let snapshot = match self.tx.try_send(snapshot) {
            Ok(()) => return,
            Err(TrySendError::Full(snapshot)) | Err(TrySendError::Disconnected(snapshot)) => snapshot,
        };
        let _ = self.stale.try_recv();
        if self.tx.try_send(snapshot).is_err() {
            debug!("Snapshot dropped, channel still full");
        }
    }
}

async fn run(
    source: Arc<dyn StatusSource>,
    interval: Duration,
    channel: Channel,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Status monitor started ({:?} interval)", interval);

    loop {
        let wake = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => Wake::Tick,
            _ = trigger.notified() => Wake::Manual,
        };

        if wake == Wake::Tick && channel.tx.is_full() {
            debug!("Previous snapshot not consumed yet, skipping refresh");
            continue;
        }

        let refresh = {
            let source = source.clone();
            tokio::task::spawn_blocking(move || source.refresh())
        };
        let snapshot = tokio::select! {
            _ = cancel.cancelled() => break,
            result = refresh => match result {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Status refresh failed: {}", e);
                    continue;
                }
            },
        };

        if wake == Wake::Manual {
            ticker.reset();
        }
        channel.publish(snapshot);
    }

    info!("Status monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::service::{ServiceStatus, StartType};
    use crate::testing::FakeHost;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        refreshes: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        delay: Duration,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Self {
            CountingSource {
                refreshes: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                delay,
            }
        }
    }

    impl StatusSource for CountingSource {
        fn refresh(&self) -> StatusSnapshot {
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.active.fetch_sub(1, Ordering::SeqCst);

            StatusSnapshot {
                service: ServiceRecord {
                    name: "beszelagent".to_string(),
                    status: ServiceStatus::Running,
                    start_type: StartType::Automatic,
                    install_path: None,
                },
                version: VersionInfo::default(),
                taken_at: Local::now(),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn delivers_snapshots_until_shutdown() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let (monitor, rx) =
            StatusMonitor::spawn(&Handle::current(), source.clone(), Duration::from_millis(10));

        let first = tokio::task::spawn_blocking({
            let rx = rx.clone();
            move || rx.recv_timeout(Duration::from_secs(2))
        })
        .await
        .unwrap();
        assert!(first.is_ok());

        monitor.shutdown().await;
        // An abandoned blocking refresh may still be finishing.
        tokio::time::sleep(Duration::from_millis(20)).await;
        while rx.try_recv().is_ok() {}
        let after_shutdown = source.refreshes.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(source.refreshes.load(Ordering::SeqCst), after_shutdown);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn manual_refresh_queues_behind_running_tick() {
        let source = Arc::new(CountingSource::new(Duration::from_millis(150)));
        let (monitor, rx) =
            StatusMonitor::spawn(&Handle::current(), source.clone(), Duration::from_secs(60));

        // The first tick fires at once; ask twice while it is in flight.
        tokio::time::sleep(Duration::from_millis(30)).await;
        monitor.refresh_now();
        monitor.refresh_now();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 2);
        assert_eq!(source.max_active.load(Ordering::SeqCst), 1);

        // The manual snapshot replaced the unread timed one.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        monitor.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_refreshes_never_overlap() {
        let source = Arc::new(CountingSource::new(Duration::from_millis(30)));
        let (monitor, rx) =
            StatusMonitor::spawn(&Handle::current(), source.clone(), Duration::from_millis(5));

        let drain = std::thread::spawn(move || {
            let mut received = 0;
            while received < 3 {
                if rx.recv_timeout(Duration::from_secs(2)).is_err() {
                    break;
                }
                received += 1;
            }
            received
        });
        let received = tokio::task::spawn_blocking(move || drain.join().unwrap())
            .await
            .unwrap();

        monitor.shutdown().await;
        assert_eq!(received, 3);
        assert_eq!(source.max_active.load(Ordering::SeqCst), 1);
    }

    struct CountingFeed {
        latest: Option<&'static str>,
        lookups: AtomicUsize,
    }

    impl ReleaseFeed for CountingFeed {
        fn fetch_latest_version(&self) -> Option<String> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.latest.map(str::to_string)
        }

        fn fetch_latest_artifact(&self, _asset_token: &str) -> Option<crate::release::ReleaseArtifact> {
            None
        }

        fn download(
            &self,
            _url: &str,
            _dest: &std::path::Path,
            _cancel: &CancellationToken,
        ) -> crate::error::Result<u64> {
            Err(crate::error::ManagerError::Http("offline".to_string()))
        }
    }

    fn status_with(feed: Arc<CountingFeed>) -> AgentStatus {
        let host = Arc::new(FakeHost::new());
        host.register_service("beszelagent", r"C:\agent\beszel-agent.exe");
        AgentStatus::new(SystemProbe::new(host), feed, "beszelagent")
    }

    #[test]
    fn latest_version_is_reused_between_refreshes() {
        let feed = Arc::new(CountingFeed {
            latest: Some("v0.16.1"),
            lookups: AtomicUsize::new(0),
        });
        let status = status_with(feed.clone());

        assert_eq!(status.refresh().latest_label(), "v0.16.1");
        assert_eq!(status.refresh().latest_label(), "v0.16.1");
        assert_eq!(feed.lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_latest_lookup_is_retried() {
        let feed = Arc::new(CountingFeed {
            latest: None,
            lookups: AtomicUsize::new(0),
        });
        let status = status_with(feed.clone());

        status.refresh();
        status.refresh();
        assert_eq!(feed.lookups.load(Ordering::SeqCst), 2);
    }

    struct NoFeed;

    impl ReleaseFeed for NoFeed {
        fn fetch_latest_version(&self) -> Option<String> {
            None
        }

        fn fetch_latest_artifact(&self, _asset_token: &str) -> Option<crate::release::ReleaseArtifact> {
            None
        }

        fn download(
            &self,
            _url: &str,
            _dest: &std::path::Path,
            _cancel: &CancellationToken,
        ) -> crate::error::Result<u64> {
            Err(crate::error::ManagerError::Http("offline".to_string()))
        }
    }

    #[test]
    fn agent_status_reports_failed_feed_check() {
        let host = Arc::new(FakeHost::new());
        host.register_service("beszelagent", r"C:\agent\beszel-agent.exe");
        host.set_running("beszelagent", true);

        let status = AgentStatus::new(SystemProbe::new(host), Arc::new(NoFeed), "beszelagent");
        let snapshot = status.refresh();

        assert_eq!(snapshot.service.status, ServiceStatus::Running);
        assert_eq!(snapshot.latest_label(), "Failed to check");
        assert_eq!(snapshot.installed_label(), "Unknown");
        assert_eq!(snapshot.verdict(), VersionVerdict::Unknown);
    }
}
