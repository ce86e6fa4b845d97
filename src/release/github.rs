//! GitHub releases API client.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use super::{Release, ReleaseArtifact, ReleaseFeed};
use crate::agent::config::ReleaseConfig;
use crate::error::{ManagerError, Result};

const USER_AGENT: &str = concat!("beszel-agent-manager/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone)]
pub struct GithubReleases {
    api_url: String,
    check_timeout: Duration,
    download_timeout: Duration,
}

impl GithubReleases {
    pub fn new(api_url: impl Into<String>, check_timeout: Duration, download_timeout: Duration) -> Self {
        GithubReleases {
            api_url: api_url.into(),
            check_timeout,
            download_timeout,
        }
    }

    pub fn from_config(config: &ReleaseConfig) -> Self {
        Self::new(
            config.api_url.clone(),
            config.check_timeout(),
            config.download_timeout(),
        )
    }

    fn agent(&self, timeout: Duration) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
    }

    fn fetch_release(&self) -> Option<Release> {
        let response = self
            .agent(self.check_timeout)
            .get(&self.api_url)
            .set("User-Agent", USER_AGENT)
            .set("Accept", "application/vnd.github+json")
            .call();

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                warn!("Release feed returned HTTP {}", code);
                return None;
            }
            Err(e) => {
                warn!("Release feed unreachable: {}", e);
                return None;
            }
        };

        match serde_json::from_reader::<_, Release>(response.into_reader()) {
            Ok(release) => Some(release),
            Err(e) => {
                warn!("Release feed returned malformed metadata: {}", e);
                None
            }
        }
    }
}

impl ReleaseFeed for GithubReleases {
    fn fetch_latest_version(&self) -> Option<String> {
        self.fetch_release()?.version()
    }

    fn fetch_latest_artifact(&self, asset_token: &str) -> Option<ReleaseArtifact> {
        let artifact = self.fetch_release()?.artifact(asset_token);
        if artifact.is_none() {
            warn!("Latest release has no asset matching {}", asset_token);
        }
        artifact
    }

    fn download(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
        info!("Downloading {} to {}", url, dest.display());

        let response = self
            .agent(self.download_timeout)
            .get(url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => ManagerError::Http(format!("download failed: HTTP {code}")),
                other => ManagerError::Http(format!("download failed: {other}")),
            })?;

        let mut reader = response.into_reader();
        let result = copy_cancellable(&mut reader, dest, cancel);
        if result.is_err() {
            let _ = fs::remove_file(dest);
        }
        result
    }
}

/// Copies `reader` into a new file at `dest`, checking `cancel` between
/// chunks.
pub(crate) fn copy_cancellable<R: Read>(reader: &mut R, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
    if cancel.is_cancelled() {
        return Err(ManagerError::Cancelled);
    }

    let mut file = File::create(dest)?;
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(ManagerError::Cancelled);
        }
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        file.write_all(&buf[..read])?;
        total += read as u64;
    }

    file.flush()?;
    Ok(total)
}
