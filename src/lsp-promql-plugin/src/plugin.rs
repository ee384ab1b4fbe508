//! The PromQL language handler.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use lsp_promql_resource::{LogStatusSink, ResourceOptions, ServerResource, StatusSink};

use crate::client_config::ClientConfig;
use crate::error::{PluginError, PluginResult};
use crate::settings::{settings_filename, PluginSettings, SettingsStore};

/// Client name reported to the host.
pub const CLIENT_NAME: &str = "lsp-promql";

/// Connects the host's language client to the server resource.
pub struct PromqlPlugin {
    resource: ServerResource,
    store: Arc<dyn SettingsStore>,
    sink: Arc<dyn StatusSink>,
    settings_filename: String,
    /// Last configuration handed to the host.
    configuration: Mutex<Option<ClientConfig>>,
}

impl PromqlPlugin {
    /// Create a plugin with default resource options, logging status
    /// messages.
    pub fn new(store: Arc<dyn SettingsStore>) -> PluginResult<Self> {
        Self::with_options(ResourceOptions::default(), store, Arc::new(LogStatusSink))
    }

    pub fn with_options(
        options: ResourceOptions,
        store: Arc<dyn SettingsStore>,
        sink: Arc<dyn StatusSink>,
    ) -> PluginResult<Self> {
        let settings_filename = settings_filename(&options.package);
        let resource = ServerResource::with_sink(options, Arc::clone(&sink))?;
        Ok(Self {
            resource,
            store,
            sink,
            settings_filename,
            configuration: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &'static str {
        CLIENT_NAME
    }

    pub fn resource(&self) -> &ServerResource {
        &self.resource
    }

    pub fn settings_filename(&self) -> &str {
        &self.settings_filename
    }

    pub fn settings(&self) -> PluginSettings {
        PluginSettings::load(self.store.as_ref(), &self.settings_filename)
    }

    /// Host load hook: resolve the configured command and start a download
    /// if one is needed. Returns the download task, if one was started.
    pub fn plugin_loaded(&self) -> PluginResult<Option<JoinHandle<()>>> {
        if self.resource.ready() {
            return Ok(None);
        }

        let config = self.client_config()?;
        if !config.enabled {
            debug!("{} is disabled; not installing the server", CLIENT_NAME);
            return Ok(None);
        }

        if self.resource.ready() {
            return Ok(None);
        }
        Ok(self.resource.setup()?)
    }

    /// Host unload hook: remove the cached server.
    pub fn plugin_unloaded(&self) -> PluginResult<()> {
        self.configuration.lock().take();
        Ok(self.resource.cleanup()?)
    }

    /// Build the client configuration from the current settings, resolving
    /// the program to the executable that should be launched.
    pub fn client_config(&self) -> PluginResult<ClientConfig> {
        let settings = self.settings();
        let program = settings
            .command
            .first()
            .filter(|program| !program.is_empty())
            .ok_or(PluginError::EmptyCommand)?;

        let executable = self.resource.configure(program)?;
        let config = ClientConfig::from_settings(CLIENT_NAME, &settings)
            .with_executable(executable.to_string_lossy());

        debug!("{} read config: {:?}", self.settings_filename, config);
        *self.configuration.lock() = Some(config.clone());
        Ok(config)
    }

    /// Host start hook. Declines to start while the server is unavailable
    /// and tells the user why.
    pub fn on_start(&self) -> bool {
        if self.resource.ready() {
            return true;
        }

        let command = self
            .configuration
            .lock()
            .as_ref()
            .and_then(|config| config.program().map(str::to_string))
            .or_else(|| self.settings().command.first().cloned())
            .unwrap_or_default();

        debug!("{} command {} is not ready", CLIENT_NAME, command);
        self.sink.status_message(&format!(
            "{}: Please install {} for the server to work.",
            self.resource.options().package,
            command
        ));
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use lsp_promql_resource::{
        BINARY_NAME, DownloadProgress, Platform, ReleaseCatalog, ReleaseEntry, ResourceError,
        ResourceState,
    };
    use sha2::{Digest, Sha256};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::settings::MemoryStore;

    const ARTIFACT_PATH: &str = "/promql-langserver_0.5.1_test.tar.gz";

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<String>>,
    }

    impl StatusSink for RecordingSink {
        fn status_message(&self, message: &str) {
            self.messages.lock().push(message.to_string());
        }

        fn progress(&self, _progress: DownloadProgress) {}
    }

    fn exe_name() -> String {
        format!("{}{}", BINARY_NAME, std::env::consts::EXE_SUFFIX)
    }

    fn server_archive() -> Vec<u8> {
        let data: &[u8] = b"#!/bin/sh\necho promql\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Regular);

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        builder
            .append_data(&mut header, exe_name(), data)
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn catalog_for(url: String, body: &[u8]) -> ReleaseCatalog {
        let platform = Platform::current().expect("supported test platform");
        let sha256 = hex::encode(Sha256::digest(body));
        ReleaseCatalog::from_entries(
            BINARY_NAME,
            "0.5.1",
            vec![ReleaseEntry::new(platform, url, sha256)],
        )
        .unwrap()
    }

    struct Fixture {
        root: tempfile::TempDir,
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        plugin: PromqlPlugin,
    }

    impl Fixture {
        fn new(catalog: ReleaseCatalog) -> Self {
            let root = tempfile::tempdir().unwrap();
            let bin = root.path().join("bin");
            std::fs::create_dir_all(&bin).unwrap();

            let options = ResourceOptions::default()
                .with_cache_root(root.path().join("cache"))
                .with_temp_dir(root.path())
                .with_search_path(bin)
                .with_catalog(catalog)
                .with_timeout(Duration::from_secs(10));

            let store = Arc::new(MemoryStore::new());
            let sink = Arc::new(RecordingSink::default());
            let plugin = PromqlPlugin::with_options(
                options,
                Arc::clone(&store) as Arc<dyn SettingsStore>,
                Arc::clone(&sink) as Arc<dyn StatusSink>,
            )
            .unwrap();

            Self {
                root,
                store,
                sink,
                plugin,
            }
        }

        fn offline() -> Self {
            Self::new(catalog_for(
                "http://127.0.0.1:9/promql-langserver.tar.gz".to_string(),
                b"offline",
            ))
        }

        fn write_settings(&self, content: &str) {
            self.store
                .save(self.plugin.settings_filename(), content)
                .unwrap();
        }

        fn cache_dir(&self) -> std::path::PathBuf {
            self.root.path().join("cache").join("LSP-promql")
        }
    }

    #[test]
    fn test_name() {
        let fixture = Fixture::offline();
        assert_eq!(fixture.plugin.name(), "lsp-promql");
        assert_eq!(fixture.plugin.settings_filename(), "LSP-promql.json");
    }

    #[test]
    fn test_settings_filename_follows_package() {
        let root = tempfile::tempdir().unwrap();
        let options = ResourceOptions::default()
            .with_package("LSP-promql-dev")
            .with_cache_root(root.path());
        let plugin = PromqlPlugin::with_options(
            options,
            Arc::new(MemoryStore::new()),
            Arc::new(LogStatusSink),
        )
        .unwrap();

        assert_eq!(plugin.settings_filename(), "LSP-promql-dev.json");
    }

    #[test]
    fn test_client_config_resolves_to_cache() {
        let fixture = Fixture::offline();
        fixture.write_settings(r#"{ "env": { "LANGSERVER_PROMETHEUSURL": "http://prom:9090" } }"#);

        let config = fixture.plugin.client_config().unwrap();

        let expected = fixture.cache_dir().join(exe_name());
        assert_eq!(config.program(), expected.to_str());
        assert_eq!(
            config.env.get("LANGSERVER_PROMETHEUSURL"),
            Some(&"http://prom:9090".to_string())
        );
        assert_eq!(fixture.plugin.resource().state(), ResourceState::AwaitingDownload);
        assert!(fixture.plugin.resource().download_required());
    }

    #[test]
    fn test_client_config_explicit_path() {
        let fixture = Fixture::offline();
        let server = fixture.root.path().join("promql-langserver-custom");
        std::fs::write(&server, b"binary").unwrap();
        fixture.write_settings(&format!(
            r#"{{ "command": [{:?}, "--debug"] }}"#,
            server.to_string_lossy()
        ));

        let config = fixture.plugin.client_config().unwrap();

        assert_eq!(config.program(), server.to_str());
        assert_eq!(config.args(), ["--debug".to_string()]);
        assert!(fixture.plugin.resource().ready());
        assert!(fixture.plugin.on_start());
        assert!(fixture.sink.messages.lock().is_empty());
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let fixture = Fixture::offline();
        fixture.write_settings(r#"{ "command": [] }"#);

        let err = fixture.plugin.client_config().unwrap_err();
        assert!(matches!(err, PluginError::EmptyCommand));
    }

    #[test]
    fn test_on_start_declines_when_not_ready() {
        let fixture = Fixture::offline();
        let config = fixture.plugin.client_config().unwrap();
        let program = config.program().unwrap().to_string();

        assert!(!fixture.plugin.on_start());

        let messages = fixture.sink.messages.lock();
        assert_eq!(
            messages.as_slice(),
            [format!("LSP-promql: Please install {} for the server to work.", program)]
        );
    }

    #[test]
    fn test_on_start_before_config_uses_settings_command() {
        let fixture = Fixture::offline();

        assert!(!fixture.plugin.on_start());
        assert_eq!(
            fixture.sink.messages.lock().as_slice(),
            ["LSP-promql: Please install promql-langserver for the server to work.".to_string()]
        );
    }

    #[test]
    fn test_plugin_loaded_without_runtime() {
        let fixture = Fixture::offline();

        let err = fixture.plugin.plugin_loaded().unwrap_err();
        assert!(matches!(err, PluginError::Resource(ResourceError::NoRuntime)));
        assert!(err.is_host_failure());
    }

    #[test]
    fn test_plugin_loaded_when_disabled() {
        let fixture = Fixture::offline();
        fixture.write_settings(r#"{ "enabled": false }"#);

        assert!(fixture.plugin.plugin_loaded().unwrap().is_none());
        assert!(!fixture.plugin.resource().download_in_flight());
    }

    #[tokio::test]
    async fn test_load_download_start_unload() {
        let body = server_archive();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ARTIFACT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let fixture = Fixture::new(catalog_for(format!("{}{}", server.uri(), ARTIFACT_PATH), &body));

        let handle = fixture.plugin.plugin_loaded().unwrap().expect("download started");
        handle.await.unwrap();

        assert!(fixture.plugin.resource().ready());
        assert!(fixture.plugin.on_start());
        assert!(fixture.cache_dir().join(exe_name()).is_file());

        // Already ready: nothing more to do.
        assert!(fixture.plugin.plugin_loaded().unwrap().is_none());

        fixture.plugin.plugin_unloaded().unwrap();
        assert!(!fixture.cache_dir().exists());
        assert_eq!(fixture.plugin.resource().state(), ResourceState::Unconfigured);
        assert!(!fixture.plugin.on_start());

        server.verify().await;
    }
}
