use async_trait::async_trait;

use crate::version::errors::VersionResult;

/// Raw upstream answer: status code plus body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network seam of the metadata client.
///
/// One call is one request. Dropping the returned future must release the connection.
#[async_trait]
pub trait MetadataTransport: Send + Sync {
    async fn get(&self, url: &str) -> VersionResult<TransportResponse>;
}
