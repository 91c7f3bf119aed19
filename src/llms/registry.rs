use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lk_base::credentials::CredentialStore;

use super::error::LlmError;
use super::ollama::OllamaBackend;
use super::openai_compat::OpenAiCompatBackend;
use super::{Backend, BackendId};

/// Backend id -> backend instance, one instance per id for the process lifetime.
pub struct BackendRegistry {
    credentials: Arc<dyn CredentialStore>,
    cache: Mutex<HashMap<BackendId, Arc<Backend>>>,
}

impl BackendRegistry {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials, cache: Mutex::new(HashMap::new()) }
    }

    /// Cached backend for `id`, built on first use.
    pub fn get(&self, id: &str) -> Result<Arc<Backend>, LlmError> {
        Ok(self.get_id(id.parse()?))
    }

    pub fn get_id(&self, id: BackendId) -> Arc<Backend> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!(backend = %id, "creating backend");
                Arc::new(self.build(id))
            })
            .clone()
    }

    /// Register a pre-built backend (e.g. a non-default host), replacing any cached one.
    pub fn insert(&self, backend: Backend) -> Arc<Backend> {
        let backend = Arc::new(backend);
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(backend.id(), backend.clone());
        backend
    }

    fn build(&self, id: BackendId) -> Backend {
        match id {
            BackendId::Ollama => Backend::Ollama(OllamaBackend::new()),
            BackendId::OpenAi => Backend::OpenAiCompatible(OpenAiCompatBackend::openai(self.credentials.clone())),
            BackendId::Xai => Backend::OpenAiCompatible(OpenAiCompatBackend::xai(self.credentials.clone())),
        }
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Cyclic successor over the fixed backend list; `None` gives the first id.
    pub fn next(current: Option<&str>) -> Result<BackendId, LlmError> {
        let current = current.map(str::parse::<BackendId>).transpose()?;
        Ok(BackendId::cycle(current))
    }
}

#[cfg(test)]
mod tests {
    use lk_base::credentials::SettingsCredentials;
    use lk_base::settings::MemorySettings;

    use super::*;

    fn registry() -> BackendRegistry {
        BackendRegistry::new(Arc::new(SettingsCredentials::settings_only(Arc::new(MemorySettings::default()))))
    }

    #[test]
    fn get_caches_one_instance_per_id() {
        let registry = registry();
        let a = registry.get("xai").unwrap();
        let b = registry.get("xai").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let openai = registry.get("openai").unwrap();
        assert!(!Arc::ptr_eq(&a, &openai));
    }

    #[test]
    fn get_builds_matching_variant() {
        let registry = registry();
        let ollama = registry.get("ollama").unwrap();
        assert_eq!(ollama.name(), "ollama");
        assert!(!ollama.needs_credentials());

        let xai = registry.get("xai").unwrap();
        assert_eq!(xai.id(), BackendId::Xai);
        assert!(xai.needs_credentials());
        assert_eq!(xai.default_model().unwrap(), "grok-base");
    }

    #[test]
    fn insert_replaces_cached_instance() {
        let registry = registry();
        let before = registry.get("ollama").unwrap();
        let inserted = registry.insert(Backend::Ollama(OllamaBackend::with_host("http://127.0.0.1:9")));
        let after = registry.get("ollama").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&inserted, &after));
    }

    #[test]
    fn get_unknown_backend() {
        assert!(matches!(registry().get("anthropic"), Err(LlmError::UnknownBackend(_))));
    }

    #[test]
    fn next_cycles_fixed_list() {
        assert_eq!(BackendRegistry::next(None).unwrap().as_str(), "ollama");
        assert_eq!(BackendRegistry::next(Some("ollama")).unwrap().as_str(), "openai");
        assert_eq!(BackendRegistry::next(Some("openai")).unwrap().as_str(), "xai");
        assert_eq!(BackendRegistry::next(Some("xai")).unwrap().as_str(), "ollama");
    }

    #[test]
    fn next_rejects_unknown_current() {
        assert!(matches!(BackendRegistry::next(Some("bard")), Err(LlmError::UnknownBackend(_))));
    }

    #[test]
    fn query_without_key_fails_with_no_credentials() {
        let backend = registry().get("openai").unwrap();
        assert!(matches!(backend.query("gpt-4o", "hello"), Err(LlmError::NoCredentials { .. })));
    }
}
