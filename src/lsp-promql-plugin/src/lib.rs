//! Editor integration for the PromQL language server.
//!
//! Reads user settings, asks the server resource for an executable and
//! produces the [`ClientConfig`] the host's language client launches.

mod client_config;
mod error;
mod plugin;
pub mod settings;

pub use client_config::ClientConfig;
pub use error::{PluginError, PluginResult};
pub use plugin::{PromqlPlugin, CLIENT_NAME};
pub use settings::{JsonFileStore, MemoryStore, PluginSettings, SettingsStore};
