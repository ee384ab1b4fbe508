//! Artifact download into a self-deleting temporary file.

use futures::StreamExt;
use std::path::Path;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::catalog::ReleaseEntry;
use crate::error::{ResourceError, ResourceResult};

/// Progress information during download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far
    pub downloaded: u64,
    /// Total bytes to download (0 when the server did not say)
    pub total: u64,
}

impl DownloadProgress {
    /// Get download progress as a percentage (0-100).
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.downloaded as f32 / self.total as f32) * 100.0
    }

    /// Get human-readable downloaded size.
    pub fn downloaded_human(&self) -> String {
        format_bytes(self.downloaded)
    }

    /// Get human-readable total size.
    pub fn total_human(&self) -> String {
        format_bytes(self.total)
    }
}

/// Format bytes as human-readable string.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// One download attempt.
///
/// Owns the temporary archive; the file is deleted when the task is dropped,
/// whichever way the install sequence exits.
pub struct DownloadTask {
    url: String,
    archive: TempPath,
}

impl DownloadTask {
    /// Reserve a temporary file for the artifact, in `temp_dir` or the system
    /// temp directory.
    pub fn new(entry: &ReleaseEntry, temp_dir: Option<&Path>) -> ResourceResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("lsp-promql-").suffix(".tar.gz");

        let file = match temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };

        debug!("Reserved {:?} for {}", file.path(), entry.file_name());

        Ok(Self {
            url: entry.url.clone(),
            archive: file.into_temp_path(),
        })
    }

    /// Path of the temporary archive.
    pub fn path(&self) -> &Path {
        &self.archive
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stream the artifact into the temporary file.
    pub async fn fetch<F>(&self, client: &reqwest::Client, mut on_progress: F) -> ResourceResult<u64>
    where
        F: FnMut(DownloadProgress),
    {
        let response = client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(ResourceError::DownloadFailed {
                status: response.status().as_u16(),
                url: self.url.clone(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        let mut downloaded: u64 = 0;

        let mut file = tokio::fs::File::create(self.path()).await?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;

            downloaded += chunk.len() as u64;
            on_progress(DownloadProgress { downloaded, total });
        }

        file.flush().await?;
        file.sync_all().await?;

        // Log download size for large files
        if downloaded > 10 * 1024 * 1024 {
            info!("Downloaded {}", format_bytes(downloaded));
        }

        Ok(downloaded)
    }

    /// Delete the temporary archive, reporting failures.
    pub fn finish(self) -> ResourceResult<()> {
        self.archive.close()?;
        Ok(())
    }
}
