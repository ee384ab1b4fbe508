//! Client configuration handed to the host's language client.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::settings::PluginSettings;

/// Everything the host needs to launch and talk to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientConfig {
    pub name: String,
    pub enabled: bool,
    /// Command line; the first element is the resolved executable
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub languages: Vec<String>,
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl ClientConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            command: Vec::new(),
            env: BTreeMap::new(),
            languages: Vec::new(),
            settings: serde_json::Map::new(),
        }
    }

    /// Start from user settings.
    pub fn from_settings(name: impl Into<String>, settings: &PluginSettings) -> Self {
        Self::new(name)
            .enabled(settings.enabled)
            .command(settings.command.clone())
            .env(settings.env.clone())
            .languages(settings.languages.clone())
            .settings(settings.settings.clone())
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn settings(mut self, settings: serde_json::Map<String, serde_json::Value>) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the program, keeping its arguments.
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        let executable = executable.into();
        match self.command.first_mut() {
            Some(program) => *program = executable,
            None => self.command.push(executable),
        }
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }
}
