//! Error types for the editor integration.

use std::path::PathBuf;
use thiserror::Error;

use lsp_promql_resource::ResourceError;

/// Result type for plugin operations.
pub type PluginResult<T> = std::result::Result<T, PluginError>;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("Failed to write settings to {path}: {source}")]
    SettingsWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read settings from {path}: {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No server command configured")]
    EmptyCommand,
}

impl PluginError {
    /// Whether the failure came from a missing host service rather than
    /// from configuration.
    pub fn is_host_failure(&self) -> bool {
        matches!(
            self,
            Self::Resource(ResourceError::NoRuntime | ResourceError::CacheRootUnavailable)
        )
    }
}
