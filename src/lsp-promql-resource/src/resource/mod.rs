//! Resolution and background installation of the language server executable.


use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::archive::{extract_tar_gz, find_binary_recursive};
use crate::checksum::verify_sha256;
use crate::download::DownloadTask;
use crate::error::{ResourceError, ResourceResult};
use crate::http::create_http_client;
use crate::options::ResourceOptions;
use crate::platform::Platform;
use crate::receipt::InstallReceipt;
use crate::state::{Failure, FailureKind, ResourceState};
use crate::status::{LogStatusSink, StatusSink};

/// Prefix of the directory a download is unpacked into before it replaces
/// the cache directory.
const STAGING_PREFIX: &str = ".lsp-promql-staging-";

/// Paths resolved by the last `configure()`.
#[derive(Debug, Default, Clone)]
struct Resolved {
    command: Option<String>,
    executable: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
}

/// Where a download installs to, captured when it starts.
#[derive(Debug, Clone)]
struct InstallTarget {
    command: String,
    executable: PathBuf,
    cache_dir: PathBuf,
}

struct Inner {
    options: ResourceOptions,
    client: reqwest::Client,
    sink: Arc<dyn StatusSink>,
    state: watch::Sender<ResourceState>,
    resolved: RwLock<Resolved>,
    download_required: AtomicBool,
    download_in_flight: AtomicBool,
    /// Bumped by `configure()` and `cleanup()`; a download started under an
    /// older generation does not publish its result.
    generation: AtomicU64,
    /// Serializes replacing and removing the cache directory.
    install_lock: Mutex<()>,
}

/// Owner of the language server executable and its cache directory.
///
/// Cloning yields another handle to the same resource.
#[derive(Clone)]
pub struct ServerResource {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ServerResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerResource")
            .field("state", &self.state())
            .field("resolved", &*self.inner.resolved.read())
            .finish()
    }
}

/// Whether a command names a file rather than something to search for.
fn is_explicit_path(command: &str) -> bool {
    command.contains('/') || command.contains(std::path::MAIN_SEPARATOR)
}

/// File name of the executable in the cache directory.
fn executable_file_name(command: &str) -> String {
    let suffix = std::env::consts::EXE_SUFFIX;
    if suffix.is_empty() || command.ends_with(suffix) {
        command.to_string()
    } else {
        format!("{}{}", command, suffix)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn join_error(e: tokio::task::JoinError) -> ResourceError {
    ResourceError::TaskFailed {
        message: e.to_string(),
    }
}

impl ServerResource {
    /// Create a resource with the default options and a logging status sink.
    pub fn new() -> ResourceResult<Self> {
        Self::with_options(ResourceOptions::default())
    }

    pub fn with_options(options: ResourceOptions) -> ResourceResult<Self> {
        Self::with_sink(options, Arc::new(LogStatusSink))
    }

    pub fn with_sink(options: ResourceOptions, sink: Arc<dyn StatusSink>) -> ResourceResult<Self> {
        if options.catalog.for_current_platform().is_none() {
            warn!(
                "No {} release for platform {}; it cannot be downloaded automatically",
                options.catalog.binary(),
                Platform::current_key()
            );
        }

        let client = create_http_client(options.timeout)?;
        let (state, _) = watch::channel(ResourceState::Unconfigured);

        Ok(Self {
            inner: Arc::new(Inner {
                options,
                client,
                sink,
                state,
                resolved: RwLock::new(Resolved::default()),
                download_required: AtomicBool::new(false),
                download_in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                install_lock: Mutex::new(()),
            }),
        })
    }

    pub fn options(&self) -> &ResourceOptions {
        &self.inner.options
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ResourceState {
        self.inner.state.borrow().clone()
    }

    /// Whether the executable can be launched.
    pub fn ready(&self) -> bool {
        self.inner.state.borrow().is_ready()
    }

    /// Subscribe to state changes. Completion of a download is observed as a
    /// change to `Ready` or `Failed`.
    pub fn subscribe(&self) -> watch::Receiver<ResourceState> {
        self.inner.state.subscribe()
    }

    /// Path resolved by the last `configure()`.
    pub fn executable(&self) -> Option<PathBuf> {
        self.inner.resolved.read().executable.clone()
    }

    /// Cache directory, once a cached install has been considered.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.inner.resolved.read().cache_dir.clone()
    }

    pub fn download_required(&self) -> bool {
        self.inner.download_required.load(Ordering::Acquire)
    }

    pub fn download_in_flight(&self) -> bool {
        self.inner.download_in_flight.load(Ordering::Acquire)
    }

    fn publish(&self, state: ResourceState) {
        debug!("Server resource state: {}", state);
        self.inner.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    fn search(&self, command: &str) -> Option<PathBuf> {
        let found = match &self.inner.options.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_default();
                which::which_in(command, Some(paths), cwd)
            }
            None => which::which(command),
        };
        found.ok()
    }

    /// A cached executable counts as installed only with a matching receipt.
    /// Without a catalog entry there is nothing to match, so the file alone
    /// decides.
    fn is_installed(&self, cache_dir: &Path, executable: &Path) -> bool {
        if !executable.is_file() {
            return false;
        }

        let catalog = &self.inner.options.catalog;
        match catalog.for_current_platform() {
            Some(entry) => InstallReceipt::load(cache_dir)
                .map(|receipt| receipt.matches(catalog, entry))
                .unwrap_or(false),
            None => true,
        }
    }

    /// Resolve `command` to the executable that should be launched.
    ///
    /// - a command containing a path separator is used as is and never
    ///   downloaded;
    /// - a command found on the search path is returned unchanged, so the
    ///   lookup happens again at launch time;
    /// - anything else lives in the cache directory and is downloaded by
    ///   `setup()` when missing.
    pub fn configure(&self, command: &str) -> ResourceResult<PathBuf> {
        {
            let resolved = self.inner.resolved.read();
            if self.download_in_flight() && resolved.command.as_deref() == Some(command) {
                if let Some(executable) = &resolved.executable {
                    return Ok(executable.clone());
                }
            }
        }

        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.download_required.store(false, Ordering::Release);
        // A ready resource stays ready while it is re-resolved.
        if !self.ready() {
            self.publish(ResourceState::Resolving);
        }

        if is_explicit_path(command) {
            let executable = PathBuf::from(command);
            self.store(command, &executable, None);

            if executable.is_file() {
                self.publish(ResourceState::Ready);
            } else {
                debug!("Configured executable {:?} does not exist", executable);
                self.publish(ResourceState::Failed(Failure::new(
                    FailureKind::NotFound,
                    format!("{} does not exist", executable.display()),
                )));
            }
            return Ok(executable);
        }

        if let Some(found) = self.search(command) {
            debug!("Found {} at {:?}", command, found);
            let executable = PathBuf::from(command);
            self.store(command, &executable, None);
            self.publish(ResourceState::Ready);
            return Ok(executable);
        }

        let cache_dir = self.inner.options.cache_dir()?;
        std::fs::create_dir_all(&cache_dir)?;
        let executable = cache_dir.join(executable_file_name(command));
        self.store(command, &executable, Some(cache_dir.as_path()));

        if self.is_installed(&cache_dir, &executable) {
            debug!("Using cached server at {:?}", executable);
            self.publish(ResourceState::Ready);
        } else {
            debug!("Server not cached at {:?}; download required", executable);
            self.inner.download_required.store(true, Ordering::Release);
            self.publish(ResourceState::AwaitingDownload);
        }

        Ok(executable)
    }

    fn store(&self, command: &str, executable: &Path, cache_dir: Option<&Path>) {
        let mut resolved = self.inner.resolved.write();
        resolved.command = Some(command.to_string());
        resolved.executable = Some(executable.to_path_buf());
        resolved.cache_dir = cache_dir.map(Path::to_path_buf);
    }

    /// Start the background download if one is required and none is running.
    ///
    /// Returns the handle of the started task. The caller may ignore it and
    /// watch `ready()` or `subscribe()` instead; there is no cancellation.
    pub fn setup(&self) -> ResourceResult<Option<JoinHandle<()>>> {
        if !self.download_required() || self.ready() {
            return Ok(None);
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ResourceError::NoRuntime)?;

        let Some((target, generation)) = self.begin_download()? else {
            return Ok(None);
        };

        let this = self.clone();
        Ok(Some(runtime.spawn(async move {
            // The outcome is published and reported by run_download.
            let _ = this.run_download(target, generation).await;
        })))
    }

    /// Download, verify and install the server on the caller's task.
    ///
    /// Publishes `Downloading` and then `Ready` or `Failed`, like a download
    /// started by `setup()`. Fails with `DownloadInProgress` while another
    /// download runs.
    pub async fn download_server(&self) -> ResourceResult<()> {
        match self.begin_download()? {
            Some((target, generation)) => self.run_download(target, generation).await,
            None => Err(ResourceError::DownloadInProgress),
        }
    }

    /// Claim the download slot and capture where the server will be
    /// installed. `None` when a download is already running.
    fn begin_download(&self) -> ResourceResult<Option<(InstallTarget, u64)>> {
        if self
            .inner
            .download_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Server download already in progress");
            return Ok(None);
        }

        let target = match self.install_target() {
            Ok(target) => target,
            Err(e) => {
                self.inner.download_in_flight.store(false, Ordering::Release);
                return Err(e);
            }
        };
        let generation = self.inner.generation.load(Ordering::Acquire);
        self.publish(ResourceState::Downloading);
        Ok(Some((target, generation)))
    }

    fn install_target(&self) -> ResourceResult<InstallTarget> {
        let resolved = self.inner.resolved.read();
        let command = resolved
            .command
            .clone()
            .unwrap_or_else(|| self.inner.options.catalog.binary().to_string());
        let cache_dir = match &resolved.cache_dir {
            Some(dir) => dir.clone(),
            None => self.inner.options.cache_dir()?,
        };
        let executable = cache_dir.join(executable_file_name(&command));

        Ok(InstallTarget {
            command,
            executable,
            cache_dir,
        })
    }

    fn is_stale(&self, generation: u64) -> bool {
        generation != self.inner.generation.load(Ordering::Acquire)
    }

    async fn run_download(&self, target: InstallTarget, generation: u64) -> ResourceResult<()> {
        let installed = target.clone();
        let result = AssertUnwindSafe(self.install(target, generation))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(ResourceError::TaskFailed {
                    message: "download task panicked".to_string(),
                })
            });
        let current = !self.is_stale(generation);

        match result {
            Ok(()) if current => {
                self.store(
                    &installed.command,
                    &installed.executable,
                    Some(installed.cache_dir.as_path()),
                );
                self.inner.download_required.store(false, Ordering::Release);
                self.inner.download_in_flight.store(false, Ordering::Release);
                self.publish(ResourceState::Ready);
                Ok(())
            }
            Ok(()) => {
                debug!("Resource was reconfigured during download; result discarded");
                self.inner.download_in_flight.store(false, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                if e.is_security_event() {
                    error!("Server installation rejected: {}", e);
                } else {
                    warn!(
                        retriable = e.is_retriable(),
                        "Failed downloading server: {}", e
                    );
                }
                self.inner
                    .sink
                    .status_message(&format!("{}: {}", self.inner.options.package, e));

                self.inner.download_in_flight.store(false, Ordering::Release);
                if current {
                    self.publish(ResourceState::Failed(Failure::new(
                        e.failure_kind(),
                        e.to_string(),
                    )));
                }
                Err(e)
            }
        }
    }

    /// Download and verify the artifact, unpack it into a staging directory
    /// next to the cache directory, then swap the staging directory in.
    ///
    /// The cache directory is only ever replaced whole, under the install
    /// lock, so a failed or discarded install leaves it untouched.
    async fn install(&self, target: InstallTarget, generation: u64) -> ResourceResult<()> {
        let options = &self.inner.options;
        let catalog = &options.catalog;
        let InstallTarget {
            command,
            executable,
            cache_dir,
        } = target;

        let entry = catalog
            .for_current_platform()
            .cloned()
            .ok_or_else(|| ResourceError::UnsupportedPlatform {
                platform: Platform::current_key(),
            })?;

        let task = DownloadTask::new(&entry, options.temp_dir.as_deref())?;
        info!("Downloading server from {}", task.url());
        self.inner
            .sink
            .status_message(&format!("Downloading {} {}", catalog.binary(), catalog.version()));

        let sink = Arc::clone(&self.inner.sink);
        task.fetch(&self.inner.client, |progress| sink.progress(progress))
            .await?;

        let archive = task.path().to_path_buf();
        let expected = entry.sha256.clone();
        tokio::task::spawn_blocking(move || verify_sha256(&archive, &expected))
            .await
            .map_err(join_error)??;
        debug!("Checksum of {} verified", entry.file_name());

        if self.is_stale(generation) {
            debug!("Resource was reset during download; skipping installation");
            return Ok(());
        }

        let staging_root = cache_dir
            .parent()
            .map(Path::to_path_buf)
            .ok_or(ResourceError::CacheRootUnavailable)?;
        std::fs::create_dir_all(&staging_root)?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&staging_root)?;

        let archive = task.path().to_path_buf();
        let dest = staging.path().to_path_buf();
        let receipt = InstallReceipt::new(catalog, &entry);
        tokio::task::spawn_blocking(move || stage_install(&archive, &dest, &command, &receipt))
            .await
            .map_err(join_error)??;

        if let Err(e) = task.finish() {
            warn!("Failed to remove downloaded archive: {}", e);
        }

        let this = self.clone();
        let dest = cache_dir.clone();
        let committed = tokio::task::spawn_blocking(move || this.commit(staging, &dest, generation))
            .await
            .map_err(join_error)??;
        if !committed {
            return Ok(());
        }

        info!("Successfully installed {} at {:?}", catalog.binary(), executable);
        self.inner.sink.status_message(&format!(
            "{} {} installed",
            catalog.binary(),
            catalog.version()
        ));
        Ok(())
    }

    /// Replace the cache directory with a staged install, unless the
    /// resource was reset since the download started. Returns whether the
    /// install was kept.
    fn commit(&self, staging: TempDir, cache_dir: &Path, generation: u64) -> ResourceResult<bool> {
        let _guard = self.inner.install_lock.lock();

        if self.is_stale(generation) {
            debug!("Resource was reset during installation; discarding {:?}", staging.path());
            return Ok(false);
        }

        match std::fs::remove_dir_all(cache_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        std::fs::rename(staging.path(), cache_dir)?;
        Ok(true)
    }

    /// Delete the cache directory and forget the resolved executable.
    ///
    /// The resource is reset even when the directory cannot be removed; the
    /// removal error is returned afterwards.
    pub fn cleanup(&self) -> ResourceResult<()> {
        let cache_dir = self
            .inner
            .resolved
            .read()
            .cache_dir
            .clone()
            .or_else(|| self.inner.options.cache_dir().ok());

        let removed = {
            let _guard = self.inner.install_lock.lock();
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
            match cache_dir {
                Some(dir) if dir.is_dir() => {
                    info!("Removing server cache {:?}", dir);
                    std::fs::remove_dir_all(&dir)
                }
                _ => Ok(()),
            }
        };

        *self.inner.resolved.write() = Resolved::default();
        self.inner.download_required.store(false, Ordering::Release);
        self.publish(ResourceState::Unconfigured);

        removed.map_err(|e| {
            warn!("Failed to remove server cache: {}", e);
            e.into()
        })
    }
}

/// Unpack the archive into `dest`, put the executable at its expected name
/// and write the receipt. Blocking.
fn stage_install(
    archive: &Path,
    dest: &Path,
    command: &str,
    receipt: &InstallReceipt,
) -> ResourceResult<()> {
    extract_tar_gz(archive, dest)?;

    let executable = dest.join(executable_file_name(command));
    if !executable.is_file() {
        match find_binary_recursive(dest, command)? {
            Some(found) => std::fs::rename(&found, &executable)?,
            None => {
                return Err(ResourceError::BinaryNotFound {
                    binary: command.to_string(),
                });
            }
        }
    }

    make_executable(&executable)?;
    receipt.save(dest)?;
    Ok(())
}
