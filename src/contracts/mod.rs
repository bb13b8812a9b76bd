use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::version::errors::{VersionError, VersionResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse<T>
where
    T: Serialize,
{
    pub ok: bool,
    pub data: Option<T>,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: u128,
}

// ============================================================================
// Build Identity Types
// ============================================================================

/// Release track a build was published on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Release,
    Snapshot,
    Dev,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Release => "release",
            Channel::Snapshot => "snapshot",
            Channel::Dev => "dev",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(Channel::Release),
            "snapshot" => Ok(Channel::Snapshot),
            "dev" => Ok(Channel::Dev),
            other => Err(VersionError::MalformedDescriptor(format!(
                "Unknown channel: {}",
                other
            ))),
        }
    }
}

/// Structured identity of one build.
///
/// Fields are public for serialization; construct through [`BuildDescriptor::new`]
/// so the invariants below are checked:
/// - `project` is hyphen-separated runs of `[A-Za-z0-9_.]`
/// - `owner` and `repo_name` are non-empty `[A-Za-z0-9_.-]`
/// - the release channel always carries a build number
/// - `commit_hash` is 1 to 40 lowercase hex characters
///
/// Every valid descriptor survives a round trip through its canonical string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDescriptor {
    pub project: String,
    pub owner: String,
    pub repo_name: String,
    pub channel: Channel,
    pub build_number: Option<u64>,
    pub commit_hash: Option<String>,
}

impl BuildDescriptor {
    pub fn new(
        project: impl Into<String>,
        owner: impl Into<String>,
        repo_name: impl Into<String>,
        channel: Channel,
        build_number: Option<u64>,
        commit_hash: Option<String>,
    ) -> VersionResult<Self> {
        let descriptor = Self {
            project: project.into(),
            owner: owner.into(),
            repo_name: repo_name.into(),
            channel,
            build_number,
            commit_hash: commit_hash.map(|hash| hash.to_ascii_lowercase()),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> VersionResult<()> {
        if !is_project_name(&self.project) {
            return Err(VersionError::MalformedDescriptor(format!(
                "Invalid project name: {:?}",
                self.project
            )));
        }

        for (field, value) in [("owner", &self.owner), ("repoName", &self.repo_name)] {
            if !is_repository_segment(value) {
                return Err(VersionError::MalformedDescriptor(format!(
                    "Invalid {}: {:?}",
                    field, value
                )));
            }
        }

        if self.channel == Channel::Release && self.build_number.is_none() {
            return Err(VersionError::MalformedDescriptor(format!(
                "Release build of {} has no build number",
                self.project
            )));
        }

        if let Some(hash) = &self.commit_hash {
            if !is_commit_hash(hash) || hash.chars().any(|c| c.is_ascii_uppercase()) {
                return Err(VersionError::MalformedDescriptor(format!(
                    "Invalid commit hash: {}",
                    hash
                )));
            }
        }

        Ok(())
    }

    /// Cache key of the repository this build comes from
    pub fn repository_key(&self) -> (String, String) {
        (self.owner.clone(), self.repo_name.clone())
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn is_project_name(value: &str) -> bool {
    value
        .split('-')
        .all(|segment| !segment.is_empty() && segment.chars().all(is_name_char))
}

fn is_repository_segment(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| is_name_char(c) || c == '-')
}

pub(crate) fn is_commit_hash(value: &str) -> bool {
    (1..=40).contains(&value.len()) && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Latest published build as reported upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRelease {
    pub descriptor: BuildDescriptor,
    pub published_at: DateTime<Utc>,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownReason {
    /// Both builds carry different commit hashes and nothing orders them
    Unordered,
    InsufficientData,
    ChannelMismatch,
}

impl UnknownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnknownReason::Unordered => "unordered",
            UnknownReason::InsufficientData => "insufficient-data",
            UnknownReason::ChannelMismatch => "channel-mismatch",
        }
    }
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ComparisonResult {
    UpToDate,
    UpdateAvailable(RemoteRelease),
    Unknown(UnknownReason),
}

impl ComparisonResult {
    pub fn has_update(&self) -> bool {
        matches!(self, ComparisonResult::UpdateAvailable(_))
    }
}

/// Position of a commit relative to a branch head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitDistance {
    Identical,
    Behind { by: u64 },
    Ahead { by: u64 },
    Diverged { ahead_by: u64, behind_by: u64 },
}

/// Comparison outcome plus the commit distance used to reach it, when one was looked up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    pub result: ComparisonResult,
    pub distance: Option<CommitDistance>,
}

impl UpdateCheck {
    /// Commits the running build trails the compared branch by
    pub fn commits_behind(&self) -> Option<u64> {
        match self.distance {
            Some(CommitDistance::Behind { by }) => Some(by),
            Some(CommitDistance::Diverged { behind_by, .. }) => Some(behind_by),
            _ => None,
        }
    }
}

/// The five strings a project fork hands to its version fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectIdentity {
    pub download_page: String,
    pub organization: String,
    pub brand: String,
    pub owner: String,
    pub repo_name: String,
}

// ============================================================================
// Resolver Configuration
// ============================================================================

pub const DEFAULT_BASE_URL: &str = "https://api.github.com/repos";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;
pub const DEFAULT_USER_AGENT: &str = "release-probe/0.1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Growth per retry. Loaded configs must use at least 1; a smaller value set in code
    /// is treated as 1 so delays never shrink.
    #[serde(deserialize_with = "deserialize_factor")]
    pub factor: f64,
    /// Fraction of each delay added or removed at random, clamped to `[0, 1]`
    pub jitter: f64,
    pub max_delay_ms: u64,
}

fn deserialize_factor<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let factor = f64::deserialize(deserializer)?;
    if factor.is_finite() && factor >= 1.0 {
        Ok(factor)
    } else {
        Err(de::Error::custom(format!(
            "retry factor must be a finite number of at least 1, got {}",
            factor
        )))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            factor: 2.0,
            jitter: 0.2,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverConfig {
    /// Upstream API root; requests go to `{baseUrl}/{owner}/{repo}/...`
    pub base_url: String,
    pub timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub user_agent: String,
    pub token: Option<String>,
    /// Branch used to order builds that only differ by commit hash
    pub compare_branch: Option<String>,
    pub retry: RetryConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            token: None,
            compare_branch: None,
            retry: RetryConfig::default(),
        }
    }
}

impl ResolverConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
