use async_trait::async_trait;

use crate::contracts::ResolverConfig;
use crate::version::errors::{VersionError, VersionResult};
use crate::version::source_trait::{MetadataTransport, TransportResponse};

/// reqwest-backed transport speaking the GitHub REST API dialect
pub struct ReqwestTransport {
    client: reqwest::Client,
    token: Option<String>,
}

impl ReqwestTransport {
    pub fn new(config: &ResolverConfig) -> VersionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| VersionError::UpstreamUnavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token: config.token.clone(),
        })
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> VersionError {
    if error.is_timeout() {
        VersionError::Timeout(format!("Request to {} timed out", url))
    } else {
        VersionError::UpstreamUnavailable(format!("Request to {} failed: {}", url, error))
    }
}

#[async_trait]
impl MetadataTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> VersionResult<TransportResponse> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");

        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| map_reqwest_error(url, e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| map_reqwest_error(url, e))?;

        Ok(TransportResponse { status, body })
    }
}
