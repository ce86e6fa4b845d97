//! Remote release feed: latest version lookup, artifact resolution and
//! artifact download.

pub mod github;

use std::path::Path;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::version::normalize;

pub use github::GithubReleases;

/// Latest-release metadata as returned by the releases API.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

/// Downloadable package for this platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseArtifact {
    /// Release version without the leading `v`, when it could be determined.
    pub version: Option<String>,
    pub asset_name: String,
    pub url: String,
}

/// Source of agent releases.
///
/// Lookups return `None` when the feed is unavailable for any reason;
/// callers must treat that as "unknown", never as "up to date".
pub trait ReleaseFeed: Send + Sync {
    fn fetch_latest_version(&self) -> Option<String>;

    /// Latest release asset whose name contains `asset_token`.
    fn fetch_latest_artifact(&self, asset_token: &str) -> Option<ReleaseArtifact>;

    /// Streams `url` to `dest`, returning the byte count. A failed or
    /// cancelled download leaves no file behind.
    fn download(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<u64>;

    fn fetch_latest_artifact_url(&self, asset_token: &str) -> Option<String> {
        self.fetch_latest_artifact(asset_token).map(|artifact| artifact.url)
    }
}

impl Release {
    /// Tag without the leading `v`, `None` for an empty tag.
    pub fn version(&self) -> Option<String> {
        let tag = self.tag_name.trim();
        (!tag.is_empty()).then(|| normalize(tag).to_string())
    }

    pub fn select_asset(&self, asset_token: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.name.contains(asset_token))
    }

    pub fn artifact(&self, asset_token: &str) -> Option<ReleaseArtifact> {
        let asset = self.select_asset(asset_token)?;
        Some(ReleaseArtifact {
            version: self
                .version()
                .or_else(|| version_from_url(&asset.browser_download_url)),
            asset_name: asset.name.clone(),
            url: asset.browser_download_url.clone(),
        })
    }
}

/// Version from a download URL such as `.../download/v0.17.0/agent.zip`.
pub fn version_from_url(url: &str) -> Option<String> {
    url.split('/').find_map(|segment| {
        let digits = normalize(segment);
        let looks_like_version = digits.split('.').count() == 3
            && digits
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        looks_like_version.then(|| digits.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "beszel-agent_windows_amd64.zip";

    fn release(tag: &str, names: &[&str]) -> Release {
        Release {
            tag_name: tag.to_string(),
            assets: names
                .iter()
                .map(|name| Asset {
                    name: name.to_string(),
                    browser_download_url: format!(
                        "https://github.com/henrygd/beszel/releases/download/{tag}/{name}"
                    ),
                })
                .collect(),
        }
    }

    #[test]
    fn selects_matching_windows_asset() {
        let release = release(
            "v0.17.0",
            &[
                "beszel-agent_linux_amd64.tar.gz",
                "beszel-agent_windows_amd64.zip",
                "beszel_windows_amd64.zip",
            ],
        );

        let artifact = release.artifact(TOKEN).unwrap();
        assert_eq!(artifact.asset_name, "beszel-agent_windows_amd64.zip");
        assert_eq!(artifact.version.as_deref(), Some("0.17.0"));
        assert!(artifact.url.ends_with("/v0.17.0/beszel-agent_windows_amd64.zip"));
    }

    #[test]
    fn no_matching_asset_is_unavailable() {
        let release = release("v0.17.0", &["beszel-agent_linux_arm64.tar.gz"]);
        assert!(release.artifact(TOKEN).is_none());
    }

    #[test]
    fn empty_tag_has_no_version() {
        let release = release("", &[]);
        assert_eq!(release.version(), None);
    }

    #[test]
    fn version_is_recovered_from_url_when_tag_is_missing() {
        let mut release = release("v0.12.3", &[TOKEN]);
        release.tag_name.clear();
        assert_eq!(release.artifact(TOKEN).unwrap().version.as_deref(), Some("0.12.3"));
    }

    #[test]
    fn version_from_url_ignores_other_segments() {
        assert_eq!(version_from_url("https://example.com/files/agent.zip"), None);
        assert_eq!(
            version_from_url("https://example.com/download/0.1.2/agent.zip").as_deref(),
            Some("0.1.2")
        );
    }

    #[test]
    fn deserializes_api_payload_and_ignores_extra_fields() {
        let json = r#"{
            "tag_name": "v0.16.1",
            "name": "Beszel 0.16.1",
            "assets": [
                {"name": "beszel-agent_windows_amd64.zip", "size": 1234,
                 "browser_download_url": "https://example.com/a.zip"}
            ]
        }"#;
        let release: Release = serde_json::from_str(json).unwrap();
        assert_eq!(release.version().as_deref(), Some("0.16.1"));
        assert_eq!(release.assets.len(), 1);
    }
}
