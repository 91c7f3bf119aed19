//! Backend abstraction layer.
//!
//! A closed set of streaming text-generation providers behind one capability
//! set: list models, pick next/default model, report whether credentials are
//! needed, open a streaming query.

pub mod error;
pub mod ollama;
pub mod openai_compat;
pub mod registry;
pub mod stream;
#[cfg(test)]
pub(crate) mod test_server;

use std::fmt;
use std::str::FromStr;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};

pub use error::LlmError;
pub use registry::BackendRegistry;
pub use stream::ResponseStream;

use ollama::OllamaBackend;
use openai_compat::OpenAiCompatBackend;

/// Backend identifiers, in cycling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    Ollama,
    OpenAi,
    Xai,
}

impl BackendId {
    pub const ALL: [BackendId; 3] = [BackendId::Ollama, BackendId::OpenAi, BackendId::Xai];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendId::Ollama => "ollama",
            BackendId::OpenAi => "openai",
            BackendId::Xai => "xai",
        }
    }

    /// Cyclic successor; `None` maps to the first backend.
    pub fn cycle(current: Option<BackendId>) -> BackendId {
        match current {
            None => Self::ALL[0],
            Some(id) => {
                let idx = Self::ALL.iter().position(|b| *b == id).unwrap_or(0);
                Self::ALL[(idx + 1) % Self::ALL.len()]
            }
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| LlmError::UnknownBackend(s.to_string()))
    }
}

/// One streaming provider.
pub enum Backend {
    Ollama(OllamaBackend),
    OpenAiCompatible(OpenAiCompatBackend),
}

impl Backend {
    pub fn id(&self) -> BackendId {
        match self {
            Backend::Ollama(_) => BackendId::Ollama,
            Backend::OpenAiCompatible(b) => b.id(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.id().as_str()
    }

    pub fn needs_credentials(&self) -> bool {
        match self {
            Backend::Ollama(_) => false,
            Backend::OpenAiCompatible(_) => true,
        }
    }

    /// Available models in provider order (sorted).
    pub fn models(&self) -> Result<Vec<String>, LlmError> {
        match self {
            Backend::Ollama(b) => b.models(),
            Backend::OpenAiCompatible(b) => b.models(),
        }
    }

    pub fn default_model(&self) -> Result<String, LlmError> {
        match self {
            Backend::Ollama(b) => b.default_model(),
            Backend::OpenAiCompatible(b) => Ok(b.default_model().to_string()),
        }
    }

    /// Forget any cached model listing, e.g. after the key changed.
    pub fn reset_models(&self) {
        if let Backend::OpenAiCompatible(b) = self {
            b.reset_models();
        }
    }

    /// Cyclic successor over `models()`; unknown or absent `current` gives the first model.
    pub fn next_model(&self, current: Option<&str>) -> Result<String, LlmError> {
        let models = self.models()?;
        list_next(&models, current)
            .cloned()
            .ok_or_else(|| LlmError::NoModels { backend: self.name().to_string() })
    }

    /// Open a streaming query. No network I/O happens until the stream is first pulled.
    pub fn query(&self, model: &str, prompt: &str) -> Result<Box<dyn ResponseStream>, LlmError> {
        tracing::info!(backend = self.name(), model, "opening query");
        match self {
            Backend::Ollama(b) => Ok(Box::new(b.query(model, prompt))),
            Backend::OpenAiCompatible(b) => Ok(Box::new(b.query(model, prompt)?)),
        }
    }
}

/// Cyclic successor of `current` in `members`. A `current` that is absent
/// (or not a member) selects the first entry. `None` only for an empty list.
pub fn list_next<'a, T: AsRef<str>>(members: &'a [T], current: Option<&str>) -> Option<&'a T> {
    if members.is_empty() {
        return None;
    }
    let idx = current
        .and_then(|c| members.iter().position(|m| m.as_ref() == c))
        .map(|i| (i + 1) % members.len())
        .unwrap_or(0);
    members.get(idx)
}

/// Blocking client with no overall timeout: streamed answers can take minutes.
pub(crate) fn http_client() -> Client {
    Client::builder().timeout(None).build().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "falling back to default HTTP client");
        Client::new()
    })
}

/// Map auth failures and non-success statuses to typed errors.
pub(crate) fn check_response(backend: BackendId, response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(LlmError::AuthenticationFailed { backend: backend.to_string() });
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(LlmError::Api { status: status.as_u16(), body });
    }
    Ok(response)
}
