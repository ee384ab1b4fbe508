//! Error types for lsp-promql-resource.

use thiserror::Error;

use crate::state::FailureKind;

/// Result type for resource operations.
pub type ResourceResult<T> = std::result::Result<T, ResourceError>;

/// Errors that can occur while resolving or installing the server binary.
#[derive(Debug, Error)]
pub enum ResourceError {
    // Platform errors
    #[error("No download available for platform {platform}")]
    UnsupportedPlatform { platform: String },

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Download failed with status {status}: {url}")]
    DownloadFailed { status: u16, url: String },

    // Verification errors
    #[error("SHA256 verification failed: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    // Archive errors
    #[error("Archive entry escapes the destination directory: {entry}")]
    PathTraversal { entry: String },

    #[error("Binary {binary} not found after extraction")]
    BinaryNotFound { binary: String },

    // File system errors
    #[error("IO error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Host errors
    #[error("Could not determine the user cache directory")]
    CacheRootUnavailable,

    #[error("No async runtime available to run the download")]
    NoRuntime,

    #[error("Invalid release catalog: {message}")]
    InvalidCatalog { message: String },

    #[error("Background task failed: {message}")]
    TaskFailed { message: String },

    #[error("A server download is already in progress")]
    DownloadInProgress,
}

impl ResourceError {
    /// Check if a later `setup()` may succeed without any change on the host.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::DownloadFailed { status, .. } => *status >= 500 || *status == 429,
            Self::Filesystem(_) | Self::TaskFailed { .. } | Self::DownloadInProgress => true,
            _ => false,
        }
    }

    /// Check if this error must be treated as a security event.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::PathTraversal { .. }
        )
    }

    /// Classify the error for the published resource state.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::UnsupportedPlatform { .. } => FailureKind::UnsupportedPlatform,
            Self::Network(_) | Self::DownloadFailed { .. } => FailureKind::Network,
            Self::ChecksumMismatch { .. } => FailureKind::ChecksumMismatch,
            Self::PathTraversal { .. } => FailureKind::PathTraversal,
            Self::BinaryNotFound { .. } => FailureKind::NotFound,
            Self::Filesystem(_)
            | Self::Json(_)
            | Self::CacheRootUnavailable
            | Self::NoRuntime
            | Self::InvalidCatalog { .. }
            | Self::TaskFailed { .. }
            | Self::DownloadInProgress => FailureKind::Filesystem,
        }
    }
}

/// Errors raised by the archive extractor.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Path traversal in archive entry: {entry}")]
    PathTraversal { entry: String },

    #[error("IO error during extraction: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExtractionError> for ResourceError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::PathTraversal { entry } => Self::PathTraversal { entry },
            ExtractionError::Io(e) => Self::Filesystem(e),
        }
    }
}
