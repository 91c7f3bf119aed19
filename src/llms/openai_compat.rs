//! OpenAI-compatible chat completions backend.
//!
//! OpenAI and xAI share this wire format; a backend is parameterized by id,
//! base URL and default model rather than subclassed.

use std::io::BufReader;
use std::sync::{Arc, Mutex};

use lk_base::constants::{OPENAI_BASE_URL, OPENAI_DEFAULT_MODEL, XAI_BASE_URL, XAI_DEFAULT_MODEL};
use lk_base::credentials::CredentialStore;
use reqwest::blocking::{Client, Response};
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};

use super::error::LlmError;
use super::stream::{LineStream, Parsed};
use super::{BackendId, check_response, http_client};

pub type OpenAiStream = LineStream<BufReader<Response>>;

pub struct OpenAiCompatBackend {
    id: BackendId,
    base_url: String,
    default_model: &'static str,
    credentials: Arc<dyn CredentialStore>,
    client: Client,
    /// Filled on first successful listing
    models: Mutex<Vec<String>>,
}

impl OpenAiCompatBackend {
    pub fn new(
        id: BackendId,
        base_url: &str,
        default_model: &'static str,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            id,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model,
            credentials,
            client: http_client(),
            models: Mutex::new(Vec::new()),
        }
    }

    pub fn openai(credentials: Arc<dyn CredentialStore>) -> Self {
        Self::new(BackendId::OpenAi, OPENAI_BASE_URL, OPENAI_DEFAULT_MODEL, credentials)
    }

    pub fn xai(credentials: Arc<dyn CredentialStore>) -> Self {
        Self::new(BackendId::Xai, XAI_BASE_URL, XAI_DEFAULT_MODEL, credentials)
    }

    pub fn id(&self) -> BackendId {
        self.id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_model(&self) -> &'static str {
        self.default_model
    }

    fn api_key(&self) -> Result<SecretBox<String>, LlmError> {
        self.credentials
            .get_key(self.id.as_str())
            .ok_or_else(|| LlmError::NoCredentials { backend: self.id.to_string() })
    }

    /// Model ids sorted lexicographically; cached after the first success.
    pub fn models(&self) -> Result<Vec<String>, LlmError> {
        {
            let cached = self.models.lock().unwrap_or_else(|e| e.into_inner());
            if !cached.is_empty() {
                return Ok(cached.clone());
            }
        }

        let api_key = self.api_key()?;
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .send()?;
        let response = check_response(self.id, response)?;
        let list: ModelList = response.json().map_err(|e| LlmError::Parse(e.to_string()))?;

        let ids = sorted_model_ids(list);
        tracing::debug!(backend = %self.id, count = ids.len(), "fetched model list");
        *self.models.lock().unwrap_or_else(|e| e.into_inner()) = ids.clone();
        Ok(ids)
    }

    /// Drop the cached listing so the next `models()` asks the provider again.
    pub fn reset_models(&self) {
        self.models.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// The key is resolved now; the request is sent on the first pull.
    pub fn query(&self, model: &str, prompt: &str) -> Result<OpenAiStream, LlmError> {
        let api_key = self.api_key()?;
        let client = self.client.clone();
        let id = self.id;
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage { role: "user".to_string(), content: prompt.to_string() }],
            stream: true,
        };

        Ok(LineStream::lazy(
            Box::new(move || {
                let response = client
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
                    .header("Content-Type", "application/json")
                    .json(&request)
                    .send()?;
                let response = check_response(id, response)?;
                Ok(BufReader::new(response))
            }),
            parse_sse_line,
        ))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

fn sorted_model_ids(list: ModelList) -> Vec<String> {
    let mut ids: Vec<String> = list.data.into_iter().map(|m| m.id).collect();
    ids.sort();
    ids
}

// ───────────────────────────────────────────────────────────────────
// SSE stream parsing
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

/// One SSE line. Non-`data:` lines (comments, event names, blanks) are skipped.
fn parse_sse_line(line: &str) -> Result<Parsed, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Parsed::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Parsed::Done);
    }

    let resp: StreamResponse = serde_json::from_str(data).map_err(|e| LlmError::Parse(e.to_string()))?;
    if let Some(error) = resp.error {
        return Err(LlmError::Provider(error.message));
    }

    let content = resp.choices.into_iter().next().and_then(|c| c.delta).and_then(|d| d.content).unwrap_or_default();
    if content.is_empty() { Ok(Parsed::Skip) } else { Ok(Parsed::Fragment(content)) }
}
