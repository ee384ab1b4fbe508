//! Lifecycle states published by [`ServerResource`](crate::ServerResource).

use std::fmt;

/// Category of a failed resolution or installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No release is published for this platform.
    UnsupportedPlatform,
    /// The artifact could not be fetched.
    Network,
    /// The artifact did not match the pinned checksum.
    ChecksumMismatch,
    /// The archive tried to write outside the cache directory.
    PathTraversal,
    /// The executable does not exist where it was expected.
    NotFound,
    /// Local disk failure (permissions, disk full, ...).
    Filesystem,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedPlatform => "unsupported platform",
            Self::Network => "network error",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::PathTraversal => "path traversal",
            Self::NotFound => "not found",
            Self::Filesystem => "filesystem error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reported, recoverable failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Lifecycle state of the server executable.
///
/// `Unconfigured -> Resolving -> {Ready, AwaitingDownload}` and
/// `AwaitingDownload -> Downloading -> {Ready, Failed}`. `Failed` may be
/// retried; only `cleanup()` leaves `Ready`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResourceState {
    #[default]
    Unconfigured,
    Resolving,
    AwaitingDownload,
    Downloading,
    Ready,
    Failed(Failure),
}

impl ResourceState {
    /// Whether the executable is safe to launch.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether no work is pending for this state.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => f.write_str("unconfigured"),
            Self::Resolving => f.write_str("resolving"),
            Self::AwaitingDownload => f.write_str("awaiting download"),
            Self::Downloading => f.write_str("downloading"),
            Self::Ready => f.write_str("ready"),
            Self::Failed(failure) => write!(f, "failed ({})", failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_states() {
        assert!(!ResourceState::Unconfigured.is_settled());
        assert!(!ResourceState::Downloading.is_settled());
        assert!(ResourceState::Ready.is_settled());

        let failed = ResourceState::Failed(Failure::new(FailureKind::Network, "timed out"));
        assert!(failed.is_settled());
        assert!(!failed.is_ready());
        assert_eq!(failed.failure().map(|f| f.kind), Some(FailureKind::Network));
    }
}
