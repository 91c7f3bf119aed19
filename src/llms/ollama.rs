//! Ollama (local) backend.
//!
//! Chat responses stream as newline-delimited JSON objects from `/api/chat`.
//! No credentials; the host comes from `OLLAMA_HOST`.

use std::env;
use std::io::BufReader;

use lk_base::constants::{OLLAMA_DEFAULT_HOST, OLLAMA_HOST_ENV};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};

use super::error::LlmError;
use super::stream::{LineStream, Parsed};
use super::{BackendId, check_response, http_client};

pub type OllamaStream = LineStream<BufReader<Response>>;

pub struct OllamaBackend {
    host: String,
    client: Client,
}

impl OllamaBackend {
    pub fn new() -> Self {
        let host = env::var(OLLAMA_HOST_ENV)
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| OLLAMA_DEFAULT_HOST.into());
        Self::with_host(&host)
    }

    pub fn with_host(host: &str) -> Self {
        Self { host: normalize_host(host), client: http_client() }
    }

    /// Installed models, sorted. Not cached: models can be pulled at any time.
    pub fn models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/api/tags", self.host);
        let response = check_response(BackendId::Ollama, self.client.get(&url).send()?)?;
        let tags: TagsResponse = response.json().map_err(|e| LlmError::Parse(e.to_string()))?;
        Ok(sorted_model_names(tags))
    }

    /// First installed model.
    pub fn default_model(&self) -> Result<String, LlmError> {
        self.models()?.into_iter().next().ok_or_else(|| LlmError::NoModels { backend: BackendId::Ollama.to_string() })
    }

    pub fn query(&self, model: &str, prompt: &str) -> OllamaStream {
        let client = self.client.clone();
        let url = format!("{}/api/chat", self.host);
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage { role: "user".to_string(), content: prompt.to_string() }],
            stream: true,
        };

        LineStream::lazy(
            Box::new(move || {
                let response = client.post(&url).json(&request).send()?;
                let response = check_response(BackendId::Ollama, response)?;
                Ok(BufReader::new(response))
            }),
            parse_chat_line,
        )
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// `OLLAMA_HOST` may omit the scheme (`127.0.0.1:11434`).
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    #[serde(default)]
    name: String,
    #[serde(default)]
    model: String,
}

fn sorted_model_names(tags: TagsResponse) -> Vec<String> {
    let mut names: Vec<String> = tags
        .models
        .into_iter()
        .map(|m| if m.model.is_empty() { m.name } else { m.model })
        .filter(|n| !n.is_empty())
        .collect();
    names.sort();
    names
}

fn parse_chat_line(line: &str) -> Result<Parsed, LlmError> {
    if line.trim().is_empty() {
        return Ok(Parsed::Skip);
    }
    let chunk: ChatChunk = serde_json::from_str(line).map_err(|e| LlmError::Parse(e.to_string()))?;
    if let Some(error) = chunk.error {
        return Err(LlmError::Provider(error));
    }

    let content = chunk.message.map(|m| m.content).unwrap_or_default();
    if !content.is_empty() {
        Ok(Parsed::Fragment(content))
    } else if chunk.done {
        Ok(Parsed::Done)
    } else {
        Ok(Parsed::Skip)
    }
}
