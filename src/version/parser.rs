//! Build descriptor parsing and formatting.
//!
//! Canonical form: `{project}-{channel}[-{build}][@{commit}] ({owner}/{repo})`,
//! e.g. `Nycticorax-release-100@1a2b3c4 (Winds-Studio/Nycticorax)`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::contracts::{BuildDescriptor, Channel, ProjectIdentity};
use crate::version::errors::{VersionError, VersionResult};

const DESCRIPTOR_PATTERN: &str = r"^(?P<project>[A-Za-z0-9_.]+(?:-[A-Za-z0-9_.]+)*?)-(?P<channel>(?i:release|snapshot|dev))(?:-(?P<build>\d+))?(?:@(?P<commit>[0-9A-Za-z]+))?(?:\s+\((?P<owner>[A-Za-z0-9_.-]+)/(?P<repo>[A-Za-z0-9_.-]+)\))?$";

fn descriptor_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(DESCRIPTOR_PATTERN).expect("descriptor pattern is valid"))
}

/// Fields pulled out of a raw version string, before the repository is known
struct RawParts<'a> {
    project: &'a str,
    channel: Channel,
    build_number: Option<u64>,
    commit_hash: Option<String>,
    repository: Option<(&'a str, &'a str)>,
}

fn split(raw: &str) -> VersionResult<RawParts<'_>> {
    let raw = raw.trim();
    let captures = descriptor_regex().captures(raw).ok_or_else(|| {
        VersionError::MalformedDescriptor(format!("Unrecognized build version: {:?}", raw))
    })?;

    // Both groups are mandatory in the pattern
    let project = captures.name("project").map(|m| m.as_str()).unwrap_or_default();
    let channel = captures
        .name("channel")
        .map(|m| m.as_str())
        .unwrap_or_default()
        .parse::<Channel>()?;

    let build_number = captures
        .name("build")
        .map(|m| {
            m.as_str().parse::<u64>().map_err(|e| {
                VersionError::MalformedDescriptor(format!("Invalid build number {}: {}", m.as_str(), e))
            })
        })
        .transpose()?;

    let commit_hash = captures.name("commit").map(|m| m.as_str().to_ascii_lowercase());

    let repository = match (captures.name("owner"), captures.name("repo")) {
        (Some(owner), Some(repo)) => Some((owner.as_str(), repo.as_str())),
        _ => None,
    };

    Ok(RawParts {
        project,
        channel,
        build_number,
        commit_hash,
        repository,
    })
}

/// Parse a canonical version string that names its repository
pub fn parse(raw: &str) -> VersionResult<BuildDescriptor> {
    let parts = split(raw)?;
    let (owner, repo) = parts.repository.ok_or_else(|| {
        VersionError::MalformedDescriptor(format!("Build version {:?} does not name a repository", raw.trim()))
    })?;

    BuildDescriptor::new(
        parts.project,
        owner,
        repo,
        parts.channel,
        parts.build_number,
        parts.commit_hash,
    )
}

/// Parse a version string, taking the repository from `identity` when the string omits it
pub fn parse_with_identity(raw: &str, identity: &ProjectIdentity) -> VersionResult<BuildDescriptor> {
    let parts = split(raw)?;
    let (owner, repo) = parts
        .repository
        .unwrap_or((identity.owner.as_str(), identity.repo_name.as_str()));

    BuildDescriptor::new(
        parts.project,
        owner,
        repo,
        parts.channel,
        parts.build_number,
        parts.commit_hash,
    )
}

/// Render the canonical form accepted by [`parse`]
pub fn format(descriptor: &BuildDescriptor) -> String {
    descriptor.to_string()
}

impl fmt::Display for BuildDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.project, self.channel)?;
        if let Some(build) = self.build_number {
            write!(f, "-{}", build)?;
        }
        if let Some(hash) = &self.commit_hash {
            write!(f, "@{}", hash)?;
        }
        write!(f, " ({}/{})", self.owner, self.repo_name)
    }
}
