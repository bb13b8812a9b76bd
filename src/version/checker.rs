use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::contracts::{
    BuildDescriptor, CommitDistance, ComparisonResult, RemoteRelease, ResolverConfig, UnknownReason,
    UpdateCheck,
};
use crate::version::comparator::compare;
use crate::version::errors::{VersionError, VersionResult};
use crate::version::github::GithubReleaseClient;
use crate::version::source_trait::MetadataTransport;
use crate::version::state::ResolutionCache;

/// Update checks for one running build
pub struct VersionResolver {
    current: BuildDescriptor,
    client: Arc<GithubReleaseClient>,
    cache: ResolutionCache,
    timeout: Duration,
    compare_branch: Option<String>,
}

impl VersionResolver {
    pub fn new(current: BuildDescriptor, config: &ResolverConfig) -> VersionResult<Self> {
        let client = GithubReleaseClient::new(config)?;
        Self::build(current, config, client)
    }

    pub fn with_transport(
        current: BuildDescriptor,
        config: &ResolverConfig,
        transport: Arc<dyn MetadataTransport>,
    ) -> VersionResult<Self> {
        let client = GithubReleaseClient::with_transport(config, transport);
        Self::build(current, config, client)
    }

    fn build(current: BuildDescriptor, config: &ResolverConfig, client: GithubReleaseClient) -> VersionResult<Self> {
        current.validate()?;
        Ok(Self {
            current,
            client: Arc::new(client),
            cache: ResolutionCache::new(config.cache_ttl()),
            timeout: config.timeout(),
            compare_branch: config.compare_branch.clone(),
        })
    }

    pub fn current(&self) -> &BuildDescriptor {
        &self.current
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Latest upstream release, served from the cache while fresh
    pub async fn latest(&self) -> VersionResult<RemoteRelease> {
        self.latest_until(Instant::now() + self.timeout).await
    }

    async fn latest_until(&self, deadline: Instant) -> VersionResult<RemoteRelease> {
        let client = Arc::clone(&self.client);
        let (owner, repo) = self.current.repository_key();

        let lookup = self.cache.get(&self.current.owner, &self.current.repo_name, move || async move {
            client.fetch_latest_until(&owner, &repo, deadline).await
        });

        // A caller joining someone else's fetch still gives up at its own deadline
        tokio::time::timeout_at(deadline, lookup).await.map_err(|_| {
            VersionError::Timeout(format!(
                "Latest release of {}/{} not resolved before the deadline",
                self.current.owner, self.current.repo_name
            ))
        })?
    }

    pub async fn check_for_update(&self) -> VersionResult<ComparisonResult> {
        self.check_for_update_with_deadline(Instant::now() + self.timeout)
            .await
    }

    pub async fn check_for_update_with_deadline(&self, deadline: Instant) -> VersionResult<ComparisonResult> {
        Ok(self.check_with_deadline(deadline).await?.result)
    }

    /// Like [`Self::check_for_update`], also reporting the commit distance when one was needed
    pub async fn check(&self) -> VersionResult<UpdateCheck> {
        self.check_with_deadline(Instant::now() + self.timeout).await
    }

    pub async fn check_with_deadline(&self, deadline: Instant) -> VersionResult<UpdateCheck> {
        let latest = self.latest_until(deadline).await?;
        let result = compare(&self.current, &latest);
        debug!(current = %self.current, result = ?result, "compared against latest release");

        match (&result, &self.compare_branch, &self.current.commit_hash) {
            (ComparisonResult::Unknown(UnknownReason::Unordered), Some(branch), Some(commit)) => {
                self.order_by_distance(branch, commit, latest, deadline).await
            }
            _ => Ok(UpdateCheck {
                result,
                distance: None,
            }),
        }
    }

    /// Settle two unrelated hashes by asking where the running commit sits on `branch`
    async fn order_by_distance(
        &self,
        branch: &str,
        commit: &str,
        latest: RemoteRelease,
        deadline: Instant,
    ) -> VersionResult<UpdateCheck> {
        let distance = self
            .client
            .fetch_distance_until(&self.current.owner, &self.current.repo_name, branch, commit, deadline)
            .await?;

        let result = match distance {
            CommitDistance::Behind { by } if by > 0 => ComparisonResult::UpdateAvailable(latest),
            CommitDistance::Identical | CommitDistance::Behind { .. } | CommitDistance::Ahead { .. } => {
                ComparisonResult::UpToDate
            }
            CommitDistance::Diverged { .. } => ComparisonResult::Unknown(UnknownReason::Unordered),
        };
        let check = UpdateCheck {
            result,
            distance: Some(distance),
        };
        debug!(
            branch,
            commit,
            ?distance,
            behind_by = ?check.commits_behind(),
            result = ?check.result,
            "ordered build by commit distance"
        );
        Ok(check)
    }
}
