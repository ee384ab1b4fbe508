//! Record of a verified installation in the cache directory.
//!
//! A cached executable is only trusted when a receipt for the pinned release
//! sits next to it. The receipt is written last, after verification and
//! extraction succeeded, so an interrupted install never looks complete.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::catalog::{ReleaseCatalog, ReleaseEntry};
use crate::error::ResourceResult;

/// File name of the receipt inside the cache directory.
pub const RECEIPT_FILE: &str = ".install.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub binary: String,
    pub version: String,
    pub sha256: String,
    pub url: String,
}

impl InstallReceipt {
    pub fn new(catalog: &ReleaseCatalog, entry: &ReleaseEntry) -> Self {
        Self {
            binary: catalog.binary().to_string(),
            version: catalog.version().to_string(),
            sha256: entry.sha256.to_lowercase(),
            url: entry.url.clone(),
        }
    }

    pub fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(RECEIPT_FILE)
    }

    /// Load the receipt from a cache directory. Missing or unreadable
    /// receipts are treated as absent.
    pub fn load(cache_dir: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(Self::path(cache_dir)).ok()?;
        match serde_json::from_str(&content) {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                tracing::warn!("Ignoring corrupt install receipt in {:?}: {}", cache_dir, e);
                None
            }
        }
    }

    /// Write the receipt atomically.
    pub fn save(&self, cache_dir: &Path) -> ResourceResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        let mut staged = tempfile::NamedTempFile::new_in(cache_dir)?;
        staged.write_all(content.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(Self::path(cache_dir)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Whether this receipt describes the given release artifact.
    pub fn matches(&self, catalog: &ReleaseCatalog, entry: &ReleaseEntry) -> bool {
        *self == Self::new(catalog, entry)
    }
}
