use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::contracts::{
    is_commit_hash, BuildDescriptor, Channel, CommitDistance, RemoteRelease, ResolverConfig,
};
use crate::version::errors::{VersionError, VersionResult};
use crate::version::retry::RetryPolicy;
use crate::version::source_trait::MetadataTransport;
use crate::version::transport::ReqwestTransport;

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    target_commitish: Option<String>,
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubComparison {
    status: String,
    #[serde(default)]
    ahead_by: u64,
    #[serde(default)]
    behind_by: u64,
}

/// Build number carried by a release tag: `105`, `v105`, `build-105`, `1.21.4-105`
fn build_number_from_tag(tag: &str) -> Option<u64> {
    let tag = tag.trim();
    let tag = tag
        .strip_prefix("build")
        .or_else(|| tag.strip_prefix('v'))
        .or_else(|| tag.strip_prefix('V'))
        .or_else(|| tag.strip_prefix('#'))
        .unwrap_or(tag);
    let last = tag.rsplit('-').next()?;

    if !last.is_empty() && last.chars().all(|c| c.is_ascii_digit()) {
        last.parse().ok()
    } else {
        None
    }
}

/// Branch names are not hashes; only accept something that looks like an abbreviated sha
fn commit_from_commitish(commitish: Option<&str>) -> Option<String> {
    commitish
        .filter(|value| value.len() >= 7 && is_commit_hash(value))
        .map(|value| value.to_ascii_lowercase())
}

fn into_remote_release(release: GithubRelease, owner: &str, repo: &str) -> VersionResult<RemoteRelease> {
    let channel = if release.prerelease {
        Channel::Snapshot
    } else {
        Channel::Release
    };

    let descriptor = BuildDescriptor::new(
        repo,
        owner,
        repo,
        channel,
        build_number_from_tag(&release.tag_name),
        commit_from_commitish(release.target_commitish.as_deref()),
    )
    .map_err(|e| {
        VersionError::UpstreamUnavailable(format!(
            "Release {} of {}/{} is unusable: {}",
            release.tag_name, owner, repo, e
        ))
    })?;

    let published_at = release.published_at.ok_or_else(|| {
        VersionError::UpstreamUnavailable(format!(
            "Release {} of {}/{} has no publish date",
            release.tag_name, owner, repo
        ))
    })?;

    let download_url = release
        .assets
        .into_iter()
        .next()
        .map(|asset| asset.browser_download_url)
        .or(release.html_url);

    Ok(RemoteRelease {
        descriptor,
        published_at,
        download_url,
    })
}

fn into_distance(comparison: GithubComparison) -> VersionResult<CommitDistance> {
    match comparison.status.as_str() {
        "identical" => Ok(CommitDistance::Identical),
        "behind" => Ok(CommitDistance::Behind {
            by: comparison.behind_by,
        }),
        "ahead" => Ok(CommitDistance::Ahead {
            by: comparison.ahead_by,
        }),
        "diverged" => Ok(CommitDistance::Diverged {
            ahead_by: comparison.ahead_by,
            behind_by: comparison.behind_by,
        }),
        other => Err(VersionError::UpstreamUnavailable(format!(
            "Unknown comparison status: {}",
            other
        ))),
    }
}

/// Fetches release metadata from a GitHub-style REST API
pub struct GithubReleaseClient {
    transport: Arc<dyn MetadataTransport>,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GithubReleaseClient {
    pub fn new(config: &ResolverConfig) -> VersionResult<Self> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &ResolverConfig, transport: Arc<dyn MetadataTransport>) -> Self {
        Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
            retry: RetryPolicy::new(config.retry.clone()),
        }
    }

    fn build_latest_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/{}/{}/releases/latest", self.base_url, owner, repo)
    }

    fn build_compare_url(&self, owner: &str, repo: &str, branch: &str, commit: &str) -> String {
        format!("{}/{}/{}/compare/{}...{}", self.base_url, owner, repo, branch, commit)
    }

    pub async fn fetch_latest(&self, owner: &str, repo: &str) -> VersionResult<RemoteRelease> {
        self.fetch_latest_until(owner, repo, Instant::now() + self.timeout)
            .await
    }

    /// Like [`Self::fetch_latest`], bounded by the caller's deadline instead of the configured timeout
    pub async fn fetch_latest_until(
        &self,
        owner: &str,
        repo: &str,
        deadline: Instant,
    ) -> VersionResult<RemoteRelease> {
        let url = self.build_latest_url(owner, repo);
        let body = self.get_body(owner, repo, &url, deadline).await?;

        let release: GithubRelease = serde_json::from_str(&body).map_err(|e| {
            VersionError::UpstreamUnavailable(format!("Failed to parse release of {}/{}: {}", owner, repo, e))
        })?;
        let remote = into_remote_release(release, owner, repo)?;
        debug!(owner, repo, build = ?remote.descriptor.build_number, "fetched latest release");
        Ok(remote)
    }

    pub async fn fetch_distance(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit: &str,
    ) -> VersionResult<CommitDistance> {
        self.fetch_distance_until(owner, repo, branch, commit, Instant::now() + self.timeout)
            .await
    }

    pub async fn fetch_distance_until(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit: &str,
        deadline: Instant,
    ) -> VersionResult<CommitDistance> {
        let url = self.build_compare_url(owner, repo, branch, commit);
        let body = self.get_body(owner, repo, &url, deadline).await?;

        let comparison: GithubComparison = serde_json::from_str(&body).map_err(|e| {
            VersionError::UpstreamUnavailable(format!("Failed to parse comparison for {}/{}: {}", owner, repo, e))
        })?;
        into_distance(comparison)
    }

    /// Retry transient failures until `deadline`; the pending request is dropped when it passes
    async fn get_body(&self, owner: &str, repo: &str, url: &str, deadline: Instant) -> VersionResult<String> {
        let attempts = self.retry.run(url, || self.get_once(owner, repo, url));

        match tokio::time::timeout_at(deadline, attempts).await {
            Ok(result) => result,
            Err(_) => Err(VersionError::Timeout(format!(
                "{} did not answer before the deadline",
                url
            ))),
        }
    }

    async fn get_once(&self, owner: &str, repo: &str, url: &str) -> VersionResult<String> {
        let response = self.transport.get(url).await?;
        trace!(url, status = response.status, "upstream response");

        match response.status {
            404 | 410 => Err(VersionError::ProjectNotFound {
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            _ if response.is_success() => Ok(response.body),
            status => Err(VersionError::UpstreamUnavailable(format!(
                "{} returned HTTP {}",
                url, status
            ))),
        }
    }
}
