//! Persisted user settings: selected backend, per-backend model and key.
//!
//! Stored as JSON under the platform config directory. Every field has a
//! default so older or hand-edited files still load.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{APP_DIR, SETTINGS_FILE};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No config directory available on this platform")]
    NoConfigDir,
}

fn default_first_run() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Selected backend id (`ollama`, `openai`, `xai`)
    #[serde(default)]
    pub backend: Option<String>,
    /// Backend id -> model name
    #[serde(default)]
    pub backend_models: HashMap<String, String>,
    /// Backend id -> API key
    #[serde(default)]
    pub backend_keys: HashMap<String, String>,
    #[serde(default = "default_first_run")]
    pub first_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: None,
            backend_models: HashMap::new(),
            backend_keys: HashMap::new(),
            first_run: true,
        }
    }
}

impl Settings {
    /// Configured model for `backend`, if any.
    pub fn model_for(&self, backend: &str) -> Option<&str> {
        self.backend_models.get(backend).map(|s| s.as_str())
    }
}

/// Where settings are read from and written to.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings, SettingsError>;
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
    /// Human-readable location, shown on the settings screen.
    fn location(&self) -> String;
}

/// JSON file store.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<config_dir>/llmkey/config.json`
    pub fn default_location() -> Result<Self, SettingsError> {
        let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(Self::new(dir.join(APP_DIR).join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettings {
    fn load(&self) -> Result<Settings, SettingsError> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store; `save` replaces the held value.
#[derive(Default)]
pub struct MemorySettings {
    inner: Mutex<Settings>,
}

impl MemorySettings {
    pub fn new(settings: Settings) -> Self {
        Self { inner: Mutex::new(settings) }
    }
}

impl SettingsStore for MemorySettings {
    fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = settings.clone();
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
