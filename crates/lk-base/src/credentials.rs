use std::env;
use std::sync::Arc;

use secrecy::SecretBox;

use crate::constants::{OPENAI_KEY_ENV, XAI_KEY_ENV};
use crate::settings::SettingsStore;

/// Source of API keys, looked up by backend id.
pub trait CredentialStore: Send + Sync {
    fn get_key(&self, backend: &str) -> Option<SecretBox<String>>;

    fn has_key(&self, backend: &str) -> bool {
        self.get_key(backend).is_some()
    }
}

/// Environment variable holding a fallback key for `backend`.
pub fn key_env_var(backend: &str) -> Option<&'static str> {
    match backend {
        "openai" => Some(OPENAI_KEY_ENV),
        "xai" => Some(XAI_KEY_ENV),
        _ => None,
    }
}

/// Keys from the settings file, falling back to `OPENAI_API_KEY` / `XAI_API_KEY`
/// (environment or `.env`).
pub struct SettingsCredentials {
    store: Arc<dyn SettingsStore>,
    env_fallback: bool,
}

impl SettingsCredentials {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        dotenvy::dotenv().ok();
        Self { store, env_fallback: true }
    }

    /// Settings only, environment ignored.
    pub fn settings_only(store: Arc<dyn SettingsStore>) -> Self {
        Self { store, env_fallback: false }
    }
}

impl CredentialStore for SettingsCredentials {
    fn get_key(&self, backend: &str) -> Option<SecretBox<String>> {
        let from_settings = match self.store.load() {
            Ok(settings) => settings.backend_keys.get(backend).filter(|k| !k.is_empty()).cloned(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read settings for credentials");
                None
            }
        };

        let key = from_settings.or_else(|| {
            if !self.env_fallback {
                return None;
            }
            key_env_var(backend).and_then(|var| env::var(var).ok()).filter(|k| !k.is_empty())
        });

        key.map(|k| SecretBox::new(Box::new(k)))
    }
}
