//! Release feed contract tests
//!
//! Exercise the GitHub releases client against a local mock server: version
//! lookup, asset selection, failure degradation and artifact download.

use std::time::Duration;

use beszel_agent_manager::error::ManagerError;
use beszel_agent_manager::release::{GithubReleases, ReleaseFeed};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "beszel-agent_windows_amd64.zip";

fn feed(server: &MockServer) -> GithubReleases {
    GithubReleases::new(
        format!("{}/repos/henrygd/beszel/releases/latest", server.uri()),
        Duration::from_millis(500),
        Duration::from_secs(5),
    )
}

fn release_body(server: &MockServer) -> serde_json::Value {
    json!({
        "tag_name": "v0.17.0",
        "assets": [
            {
                "name": "beszel-agent_linux_amd64.tar.gz",
                "browser_download_url": format!("{}/download/v0.17.0/beszel-agent_linux_amd64.tar.gz", server.uri())
            },
            {
                "name": TOKEN,
                "browser_download_url": format!("{}/download/v0.17.0/{TOKEN}", server.uri())
            }
        ]
    })
}

async fn mount_release(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/repos/henrygd/beszel/releases/latest"))
        .and(header_exists("user-agent"))
        .respond_with(template)
        .mount(server)
        .await;
}

// ────────────────────────────────────────────────────────────────────────────
// Metadata
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_latest_version_strips_prefix() {
    let server = MockServer::start().await;
    mount_release(&server, ResponseTemplate::new(200).set_body_json(release_body(&server))).await;

    let feed = feed(&server);
    let version = tokio::task::spawn_blocking(move || feed.fetch_latest_version())
        .await
        .unwrap();

    assert_eq!(version.as_deref(), Some("0.17.0"));
}

#[tokio::test]
async fn test_artifact_matches_platform_asset() {
    let server = MockServer::start().await;
    mount_release(&server, ResponseTemplate::new(200).set_body_json(release_body(&server))).await;

    let feed = feed(&server);
    let artifact = tokio::task::spawn_blocking(move || feed.fetch_latest_artifact(TOKEN))
        .await
        .unwrap()
        .expect("artifact should resolve");

    assert_eq!(artifact.asset_name, TOKEN);
    assert!(artifact.url.ends_with("/download/v0.17.0/beszel-agent_windows_amd64.zip"));
    assert_eq!(artifact.version.as_deref(), Some("0.17.0"));
}

#[tokio::test]
async fn test_missing_asset_yields_none() {
    let server = MockServer::start().await;
    let body = json!({ "tag_name": "v0.17.0", "assets": [] });
    mount_release(&server, ResponseTemplate::new(200).set_body_json(body)).await;

    let feed = feed(&server);
    let url = tokio::task::spawn_blocking(move || feed.fetch_latest_artifact_url(TOKEN))
        .await
        .unwrap();

    assert_eq!(url, None);
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = MockServer::start().await;
    mount_release(&server, ResponseTemplate::new(500)).await;

    let feed = feed(&server);
    let version = tokio::task::spawn_blocking(move || feed.fetch_latest_version())
        .await
        .unwrap();

    assert_eq!(version, None);
}

#[tokio::test]
async fn test_malformed_json_is_unavailable() {
    let server = MockServer::start().await;
    mount_release(&server, ResponseTemplate::new(200).set_body_string("{\"tag_name\": ")).await;

    let feed = feed(&server);
    let version = tokio::task::spawn_blocking(move || feed.fetch_latest_version())
        .await
        .unwrap();

    assert_eq!(version, None);
}

#[tokio::test]
async fn test_slow_feed_times_out() {
    let server = MockServer::start().await;
    mount_release(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(release_body(&server))
            .set_delay(Duration::from_secs(3)),
    )
    .await;

    let feed = feed(&server);
    let version = tokio::task::spawn_blocking(move || feed.fetch_latest_version())
        .await
        .unwrap();

    assert_eq!(version, None);
}

// ────────────────────────────────────────────────────────────────────────────
// Download
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_download_writes_file() {
    let server = MockServer::start().await;
    let payload = vec![42u8; 20_000];
    Mock::given(method("GET"))
        .and(path(format!("/download/v0.17.0/{TOKEN}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("beszel-agent.zip");
    let url = format!("{}/download/v0.17.0/{TOKEN}", server.uri());

    let feed = feed(&server);
    let dest_clone = dest.clone();
    let written = tokio::task::spawn_blocking(move || {
        feed.download(&url, &dest_clone, &CancellationToken::new())
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(written, payload.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), payload);
}

#[tokio::test]
async fn test_download_not_found_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/missing.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("beszel-agent.zip");
    let url = format!("{}/download/missing.zip", server.uri());

    let feed = feed(&server);
    let dest_clone = dest.clone();
    let result = tokio::task::spawn_blocking(move || {
        feed.download(&url, &dest_clone, &CancellationToken::new())
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(ManagerError::Http(_))));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_cancelled_download_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/agent.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 4096]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("beszel-agent.zip");
    let url = format!("{}/download/agent.zip", server.uri());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let feed = feed(&server);
    let dest_clone = dest.clone();
    let result = tokio::task::spawn_blocking(move || feed.download(&url, &dest_clone, &cancel))
        .await
        .unwrap();

    assert!(matches!(result, Err(ManagerError::Cancelled)));
    assert!(!dest.exists());
}
