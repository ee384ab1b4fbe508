//! Construction-time options for [`ServerResource`](crate::ServerResource).

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::ReleaseCatalog;
use crate::error::{ResourceError, ResourceResult};
use crate::http::DEFAULT_TIMEOUT;

/// Package identifier; names the cache directory and the settings file.
pub const PACKAGE_NAME: &str = "LSP-promql";

/// Options for resolving and installing the server executable.
#[derive(Debug, Clone)]
pub struct ResourceOptions {
    /// Package identifier (default: `LSP-promql`).
    pub package: String,
    /// Root of the cache directory (default: the user cache directory).
    pub cache_root: Option<PathBuf>,
    /// Where temporary archives are written (default: system temp dir).
    pub temp_dir: Option<PathBuf>,
    /// Search path used instead of `PATH` when looking up bare commands.
    pub search_path: Option<OsString>,
    /// Release artifacts to download from.
    pub catalog: ReleaseCatalog,
    /// Timeout for a whole download (default: 5 minutes).
    pub timeout: Duration,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            package: PACKAGE_NAME.to_string(),
            cache_root: None,
            temp_dir: None,
            search_path: None,
            catalog: ReleaseCatalog::builtin(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ResourceOptions {
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    pub fn with_catalog(mut self, catalog: ReleaseCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `<cache root>/<package>`. Fails only when the host cannot tell us
    /// where user caches live.
    pub fn cache_dir(&self) -> ResourceResult<PathBuf> {
        let root = match &self.cache_root {
            Some(root) => root.clone(),
            None => dirs::cache_dir().ok_or(ResourceError::CacheRootUnavailable)?,
        };
        Ok(root.join(&self.package))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_dir_uses_package() {
        let options = ResourceOptions::default().with_cache_root("/tmp/cache-root");
        assert_eq!(
            options.cache_dir().unwrap(),
            PathBuf::from("/tmp/cache-root").join(PACKAGE_NAME)
        );

        let options = options.with_package("LSP-other");
        assert!(options.cache_dir().unwrap().ends_with("LSP-other"));
    }

    #[test]
    fn test_defaults() {
        let options = ResourceOptions::default();
        assert_eq!(options.package, PACKAGE_NAME);
        assert_eq!(options.timeout, DEFAULT_TIMEOUT);
        assert_eq!(options.catalog.binary(), "promql-langserver");
    }
}
