//! Pinned release artifacts of the PromQL language server.

use std::collections::HashSet;

use crate::error::{ResourceError, ResourceResult};
use crate::platform::{Arch, Os, Platform};

/// Name of the language server executable.
pub const BINARY_NAME: &str = "promql-langserver";

/// Pinned language server release.
pub const RELEASE_VERSION: &str = "0.5.1";

const RELEASE_BASE_URL: &str =
    "https://github.com/prometheus-community/promql-langserver/releases/download";

/// Download location and checksum of one release artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEntry {
    pub platform: Platform,
    /// Download URL of the `.tar.gz` artifact.
    pub url: String,
    /// Lowercase hex SHA256 of the artifact.
    pub sha256: String,
}

impl ReleaseEntry {
    pub fn new(platform: Platform, url: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            platform,
            url: url.into(),
            sha256: sha256.into(),
        }
    }

    /// File name of the artifact, taken from the URL.
    pub fn file_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or("download.tar.gz")
    }
}

/// Static mapping from platform to release artifact.
#[derive(Debug, Clone)]
pub struct ReleaseCatalog {
    binary: String,
    version: String,
    entries: Vec<ReleaseEntry>,
}

impl ReleaseCatalog {
    /// Build a catalog, rejecting duplicate platforms.
    pub fn from_entries(
        binary: impl Into<String>,
        version: impl Into<String>,
        entries: Vec<ReleaseEntry>,
    ) -> ResourceResult<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.platform) {
                return Err(ResourceError::InvalidCatalog {
                    message: format!("duplicate entry for {}", entry.platform),
                });
            }
            if entry.sha256.len() != 64 || hex::decode(&entry.sha256).is_err() {
                return Err(ResourceError::InvalidCatalog {
                    message: format!("malformed checksum for {}", entry.platform),
                });
            }
        }

        Ok(Self {
            binary: binary.into(),
            version: version.into(),
            entries,
        })
    }

    /// The release table shipped with this crate.
    pub fn builtin() -> Self {
        let entry = |os, arch, sha256: &str| {
            let platform = Platform::new(os, arch);
            let url = format!(
                "{}/v{}/{}",
                RELEASE_BASE_URL,
                RELEASE_VERSION,
                archive_name(BINARY_NAME, RELEASE_VERSION, platform)
            );
            ReleaseEntry::new(platform, url, sha256)
        };

        Self {
            binary: BINARY_NAME.to_string(),
            version: RELEASE_VERSION.to_string(),
            entries: vec![
                entry(
                    Os::Windows,
                    Arch::X64,
                    "bf6bfe096acce1ac920c21bedc7408ed9f51f97921a1c1d20a7eecd17a14331d",
                ),
                entry(
                    Os::MacOs,
                    Arch::X64,
                    "f5c000c9f3df70d9d0867c404a3a8b0e18253578dd9eb25c4cbbb9ee9ab04631",
                ),
                entry(
                    Os::Linux,
                    Arch::X64,
                    "55d3195b023062463448491ea071d66f6d5e33bf0a676f9b346a0b15192b0687",
                ),
            ],
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn entries(&self) -> &[ReleaseEntry] {
        &self.entries
    }

    /// Find the artifact for a platform. `None` means unsupported.
    pub fn lookup(&self, platform: Platform) -> Option<&ReleaseEntry> {
        self.entries.iter().find(|e| e.platform == platform)
    }

    /// Find the artifact for the running platform.
    pub fn for_current_platform(&self) -> Option<&ReleaseEntry> {
        Platform::current().and_then(|p| self.lookup(p))
    }
}

impl Default for ReleaseCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Artifact file name: `<binary>_<version>_<os>_<arch>.tar.gz`.
pub fn archive_name(binary: &str, version: &str, platform: Platform) -> String {
    format!(
        "{}_{}_{}_{}.tar.gz",
        binary,
        version,
        platform.os.as_str(),
        platform.arch.as_str()
    )
}
