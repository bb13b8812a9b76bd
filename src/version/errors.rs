use thiserror::Error;

/// Version resolution error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionErrorCode {
    MalformedDescriptor,
    UpstreamUnavailable,
    ProjectNotFound,
    Timeout,
}

impl VersionErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionErrorCode::MalformedDescriptor => "VERSION_MALFORMED_DESCRIPTOR",
            VersionErrorCode::UpstreamUnavailable => "VERSION_UPSTREAM_UNAVAILABLE",
            VersionErrorCode::ProjectNotFound => "VERSION_PROJECT_NOT_FOUND",
            VersionErrorCode::Timeout => "VERSION_TIMEOUT",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            VersionErrorCode::MalformedDescriptor => "Build version is malformed, check the build metadata",
            VersionErrorCode::UpstreamUnavailable => "Release source is unavailable, check the network connection",
            VersionErrorCode::ProjectNotFound => "Project was not found upstream, check the repository configuration",
            VersionErrorCode::Timeout => "Version check timed out, try again later",
        }
    }
}

/// Version resolution errors
///
/// Errors are `Clone` so one failed fetch can be handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Project not found: {owner}/{repo}")]
    ProjectNotFound { owner: String, repo: String },

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl VersionError {
    pub fn code(&self) -> VersionErrorCode {
        match self {
            VersionError::MalformedDescriptor(_) => VersionErrorCode::MalformedDescriptor,
            VersionError::UpstreamUnavailable(_) => VersionErrorCode::UpstreamUnavailable,
            VersionError::ProjectNotFound { .. } => VersionErrorCode::ProjectNotFound,
            VersionError::Timeout(_) => VersionErrorCode::Timeout,
        }
    }

    /// Only transient upstream failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, VersionError::UpstreamUnavailable(_))
    }

    pub fn user_message(&self) -> String {
        format!("{}: {}", self.code().user_message(), self)
    }
}

pub type VersionResult<T> = Result<T, VersionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_upstream_unavailable_is_retryable() {
        assert!(VersionError::UpstreamUnavailable("503".to_string()).is_retryable());
        assert!(!VersionError::Timeout("5000ms".to_string()).is_retryable());
        assert!(!VersionError::MalformedDescriptor("x".to_string()).is_retryable());
        assert!(!VersionError::ProjectNotFound {
            owner: "Winds-Studio".to_string(),
            repo: "DoesNotExist".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_user_message_includes_code_text() {
        let err = VersionError::ProjectNotFound {
            owner: "Winds-Studio".to_string(),
            repo: "DoesNotExist".to_string(),
        };
        assert_eq!(err.code().as_str(), "VERSION_PROJECT_NOT_FOUND");
        assert!(err.user_message().contains("Winds-Studio/DoesNotExist"));
    }
}
