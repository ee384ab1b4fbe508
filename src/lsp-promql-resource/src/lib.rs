//! Lifecycle management for the PromQL language server executable.
//!
//! Provides:
//! - Resolution of the configured command (explicit path, search path, cache)
//! - Background download of the pinned release for the current platform
//! - SHA256 verification of the downloaded artifact
//! - Path-traversal-safe archive extraction into the cache directory
//! - A readiness signal for the editor integration
//!
//! # Example
//!
//! ```rust,ignore
//! use lsp_promql_resource::ServerResource;
//!
//! let resource = ServerResource::new()?;
//! let executable = resource.configure("promql-langserver")?;
//!
//! // Starts at most one download; completion shows up in `ready()`.
//! resource.setup()?;
//! ```

pub mod archive;
pub mod catalog;
pub mod checksum;
pub mod download;
mod error;
pub mod http;
mod options;
pub mod platform;
pub mod receipt;
mod resource;
mod state;
mod status;

pub use archive::extract_tar_gz;
pub use catalog::{ReleaseCatalog, ReleaseEntry, BINARY_NAME, RELEASE_VERSION};
pub use checksum::verify;
pub use download::{DownloadProgress, DownloadTask};
pub use error::{ExtractionError, ResourceError, ResourceResult};
pub use options::{ResourceOptions, PACKAGE_NAME};
pub use platform::{Arch, Os, Platform};
pub use resource::ServerResource;
pub use state::{Failure, FailureKind, ResourceState};
pub use status::{LogStatusSink, StatusSink};
