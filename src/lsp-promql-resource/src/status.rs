//! User-facing status reporting.

use crate::download::DownloadProgress;

/// Sink for short, user-visible status messages (status bar, notifications).
///
/// Called from the download task, never from the caller's thread.
pub trait StatusSink: Send + Sync {
    /// Show a one-line status message.
    fn status_message(&self, message: &str);

    /// Report download progress. Ignored by default.
    fn progress(&self, _progress: DownloadProgress) {}
}

/// Status sink that forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn status_message(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn progress(&self, progress: DownloadProgress) {
        tracing::trace!(
            "Downloaded {} of {} ({:.0}%)",
            progress.downloaded_human(),
            progress.total_human(),
            progress.percentage()
        );
    }
}
