pub mod errors;
pub mod parser;
pub mod comparator;
pub mod source_trait;
pub mod transport;
pub mod retry;
pub mod github;
pub mod state;
pub mod checker;
pub mod projects;

#[cfg(test)]
pub(crate) mod test_support;

pub use checker::VersionResolver;
pub use comparator::compare;
pub use errors::{VersionError, VersionErrorCode, VersionResult};
pub use github::GithubReleaseClient;
pub use parser::{format, parse, parse_with_identity};
pub use projects::{nycticorax, sapling};
pub use source_trait::{MetadataTransport, TransportResponse};
pub use state::{CacheEntry, ResolutionCache};
pub use transport::ReqwestTransport;
