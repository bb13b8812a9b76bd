use serde::Serialize;
use std::future::Future;
use std::time::Instant;

pub mod contracts;
pub mod version;

pub use contracts::*;
pub use version::{
    compare, nycticorax, parse, parse_with_identity, sapling, GithubReleaseClient, MetadataTransport,
    ResolutionCache, ReqwestTransport, TransportResponse, VersionError, VersionErrorCode, VersionResolver,
    VersionResult,
};

/// Run one update check and wrap the outcome for the host
pub async fn check_for_update(resolver: &VersionResolver) -> CommandResponse<ComparisonResult> {
    with_timing_async(resolver.check_for_update()).await
}

async fn with_timing_async<T, Fut>(operation: Fut) -> CommandResponse<T>
where
    T: Serialize,
    Fut: Future<Output = VersionResult<T>>,
{
    let start = Instant::now();
    match operation.await {
        Ok(data) => CommandResponse {
            ok: true,
            data: Some(data),
            error_code: None,
            error: None,
            elapsed_ms: start.elapsed().as_millis(),
        },
        Err(error) => CommandResponse {
            ok: false,
            data: None,
            error_code: Some(error.code().as_str().to_string()),
            error: Some(error.user_message()),
            elapsed_ms: start.elapsed().as_millis(),
        },
    }
}
