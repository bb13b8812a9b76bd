use crate::contracts::{BuildDescriptor, ProjectIdentity};
use crate::version::errors::VersionResult;
use crate::version::parser;

impl ProjectIdentity {
    pub fn new(
        download_page: impl Into<String>,
        organization: impl Into<String>,
        brand: impl Into<String>,
        owner: impl Into<String>,
        repo_name: impl Into<String>,
    ) -> Self {
        Self {
            download_page: download_page.into(),
            organization: organization.into(),
            brand: brand.into(),
            owner: owner.into(),
            repo_name: repo_name.into(),
        }
    }

    /// Current build descriptor from the version string baked in at build time
    pub fn current_build(&self, raw_version: &str) -> VersionResult<BuildDescriptor> {
        parser::parse_with_identity(raw_version, self)
    }
}

pub fn nycticorax() -> ProjectIdentity {
    ProjectIdentity::new(
        "https://github.com/Winds-Studio/Nycticorax",
        "Winds Studio",
        "Nycticorax",
        "Winds-Studio",
        "Nycticorax",
    )
}

pub fn sapling() -> ProjectIdentity {
    ProjectIdentity::new(
        "https://github.com/Winds-Studio/Sapling",
        "Winds Studio",
        "Sapling",
        "Winds-Studio",
        "Sapling",
    )
}
