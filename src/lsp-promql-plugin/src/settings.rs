//! User settings for the PromQL client.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use lsp_promql_resource::BINARY_NAME;

use crate::error::{PluginError, PluginResult};

/// Environment variable pointing the server at a Prometheus instance.
pub const PROMETHEUS_URL_ENV: &str = "LANGSERVER_PROMETHEUSURL";

/// Settings file name for a package.
pub fn settings_filename(package: &str) -> String {
    format!("{}.json", package)
}

/// Settings read from the user's settings file. Missing keys take their
/// defaults; present keys replace the default wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Start the client at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Server command line; the first element is resolved to an executable
    #[serde(default = "default_command")]
    pub command: Vec<String>,

    /// Extra language scopes handled by the server
    #[serde(default)]
    pub languages: Vec<String>,

    /// Server settings passed through to the client
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,

    /// Environment for the server process
    #[serde(default = "default_env")]
    pub env: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_command() -> Vec<String> {
    vec![BINARY_NAME.to_string()]
}

fn default_env() -> BTreeMap<String, String> {
    BTreeMap::from([(PROMETHEUS_URL_ENV.to_string(), String::new())])
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_command(),
            languages: Vec::new(),
            settings: serde_json::Map::new(),
            env: default_env(),
        }
    }
}

impl PluginSettings {
    /// Load settings from a store. Missing or invalid content yields the
    /// defaults.
    pub fn load(store: &dyn SettingsStore, filename: &str) -> Self {
        let content = match store.load(filename) {
            Ok(Some(content)) => content,
            Ok(None) => return Self::default(),
            Err(e) => {
                tracing::warn!("Could not read {}: {}; using defaults", filename, e);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Invalid settings in {}: {}; using defaults", filename, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, store: &dyn SettingsStore, filename: &str) -> PluginResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        store.save(filename, &content)
    }
}

/// Host settings storage, keyed by file name.
pub trait SettingsStore: Send + Sync {
    /// Raw content for `filename`, or `None` when nothing is stored.
    fn load(&self, filename: &str) -> PluginResult<Option<String>>;

    fn save(&self, filename: &str, content: &str) -> PluginResult<()>;
}

/// Settings stored as JSON files in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self, filename: &str) -> PluginResult<Option<String>> {
        let path = self.path(filename);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PluginError::SettingsRead { path, source }),
        }
    }

    fn save(&self, filename: &str, content: &str) -> PluginResult<()> {
        let path = self.path(filename);
        std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(&path, content))
            .map_err(|source| PluginError::SettingsWrite { path, source })
    }
}

/// In-memory settings, for hosts without a settings directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self, filename: &str) -> PluginResult<Option<String>> {
        Ok(self.files.lock().get(filename).cloned())
    }

    fn save(&self, filename: &str, content: &str) -> PluginResult<()> {
        self.files
            .lock()
            .insert(filename.to_string(), content.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_promql_resource::PACKAGE_NAME;

    #[test]
    fn test_defaults() {
        let settings = PluginSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.command, vec!["promql-langserver".to_string()]);
        assert!(settings.languages.is_empty());
        assert!(settings.settings.is_empty());
        assert_eq!(settings.env.get(PROMETHEUS_URL_ENV), Some(&String::new()));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let store = MemoryStore::new();
        store
            .save(
                "LSP-promql.json",
                r#"{ "env": { "LANGSERVER_PROMETHEUSURL": "http://localhost:9090" } }"#,
            )
            .unwrap();

        let settings = PluginSettings::load(&store, "LSP-promql.json");
        assert_eq!(
            settings.env.get(PROMETHEUS_URL_ENV),
            Some(&"http://localhost:9090".to_string())
        );
        assert_eq!(settings.command, default_command());
        assert!(settings.enabled);
    }

    #[test]
    fn test_present_key_replaces_default() {
        let store = MemoryStore::new();
        store
            .save("LSP-promql.json", r#"{ "env": { "OTHER": "1" } }"#)
            .unwrap();

        let settings = PluginSettings::load(&store, "LSP-promql.json");
        assert_eq!(settings.env.len(), 1);
        assert_eq!(settings.env.get("OTHER"), Some(&"1".to_string()));
    }

    #[test]
    fn test_invalid_json_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.save("LSP-promql.json", "{ not json").unwrap();

        let settings = PluginSettings::load(&store, "LSP-promql.json");
        assert_eq!(settings, PluginSettings::default());
    }

    #[test]
    fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings"));

        assert_eq!(store.load("LSP-promql.json").unwrap(), None);
        assert_eq!(
            PluginSettings::load(&store, "LSP-promql.json"),
            PluginSettings::default()
        );

        let mut settings = PluginSettings::default();
        settings.languages.push("source.yaml.prometheus".to_string());
        settings.save(&store, "LSP-promql.json").unwrap();

        assert!(store.path("LSP-promql.json").is_file());
        assert_eq!(PluginSettings::load(&store, "LSP-promql.json"), settings);
    }

    #[test]
    fn test_settings_filename() {
        assert_eq!(settings_filename(PACKAGE_NAME), "LSP-promql.json");
    }
}
